//! End-to-end scenarios driving the engine with a scripted provider.

use jimi_approval::{ApprovalArbiter, ApprovalMode, ApprovalPolicy, Decision};
use jimi_config::AgentSpec;
use jimi_core::Session;
use jimi_engine::{Engine, EngineConfig, EngineError, Runtime};
use jimi_hooks::{HookDispatcher, HookExecution, HookRunner, HookSpec};
use jimi_llm::mock::MockProvider;
use jimi_llm::{LlmProvider, MessageRole};
use jimi_tools::{Tool, ToolContext, ToolError, ToolProvider};
use jimi_wire::{Wire, WireMessage, WireReceiver};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Initialize the tracing subscriber for tests; later calls are no-ops.
fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
        .with_test_writer()
        .try_init();
}

struct Fixture {
    engine: Arc<Engine>,
    mock: Arc<MockProvider>,
    session: Arc<Session>,
    approval: Arc<ApprovalArbiter>,
    wire: Wire,
    runtime: Runtime,
    _dir: TempDir,
}

fn fixture_with(config: EngineConfig, agents: Option<HashMap<String, Arc<AgentSpec>>>) -> Fixture {
    setup_test_logging();
    let dir = TempDir::new().unwrap();
    let mock = Arc::new(MockProvider::new());
    let mut builder = Engine::builder()
        .llm(Arc::clone(&mock) as Arc<dyn LlmProvider>)
        .config(config);
    if let Some(agents) = agents {
        builder = builder.agents(agents);
    }
    let engine = builder.build().unwrap();

    let session = Arc::new(Session::new(dir.path()));
    let wire = Wire::new();
    let approval = Arc::new(ApprovalArbiter::new(wire.clone(), ApprovalPolicy::default()));
    let runtime = engine
        .create_runtime("jimi", Arc::clone(&session), Arc::clone(&approval), wire.clone())
        .unwrap();

    Fixture {
        engine,
        mock,
        session,
        approval,
        wire,
        runtime,
        _dir: dir,
    }
}

fn fixture() -> Fixture {
    fixture_with(EngineConfig::default(), None)
}

/// Answer every approval prompt on the wire with a fixed decision.
fn auto_respond(wire: &Wire, approval: Arc<ApprovalArbiter>, decision: Decision) {
    let mut receiver = wire.subscribe();
    tokio::spawn(async move {
        while let Some(msg) = receiver.recv().await {
            if let WireMessage::ApprovalRequired { id, .. } = msg.as_ref() {
                approval.resolve(id, decision);
            }
        }
    });
}

fn drain(receiver: &mut WireReceiver) -> Vec<String> {
    let mut kinds = Vec::new();
    while let Some(msg) = receiver.try_recv() {
        kinds.push(msg.kind().to_string());
    }
    kinds
}

// Scenario A — single write with approval deny.
#[tokio::test]
async fn scenario_write_denied_by_user() {
    let mut fixture = fixture();
    let target = fixture._dir.path().join("x.txt");
    let args = format!(
        r#"{{"path":"{}","content":"hi"}}"#,
        target.display()
    );

    fixture
        .mock
        .push_tool_call_turn(&[("call_1", "write_file", &args)]);
    fixture.mock.push_text_turn("好的，我不会写入该文件。");

    auto_respond(&fixture.wire, Arc::clone(&fixture.approval), Decision::Deny);

    let outcome = fixture
        .engine
        .run_turn(&mut fixture.runtime, "在文件里写入 hi")
        .await
        .unwrap();

    // The file was never created and the run terminated cleanly.
    assert!(!target.exists());
    assert_eq!(outcome.final_text, "好的，我不会写入该文件。");

    // The rejection was fed back to the model as a tool message.
    let tool_msg = fixture
        .runtime
        .history
        .iter()
        .find_map(|m| m.tool_result_content())
        .unwrap();
    assert_eq!(tool_msg.tool_call_id, "call_1");
    assert_eq!(tool_msg.content, "工具调用被用户拒绝。请遵循用户的新指示。");

    // The next LLM turn saw the rejection.
    let requests = fixture.mock.requests();
    assert_eq!(requests.len(), 2);
    assert!(
        requests[1]
            .messages
            .iter()
            .any(|m| m.tool_result_content().is_some_and(
                |r| r.content.contains("工具调用被用户拒绝")
            ))
    );
}

// Scenario B — two parallel reads.
#[tokio::test]
async fn scenario_parallel_reads() {
    let mut fixture = fixture();
    let file_a = fixture._dir.path().join("a.txt");
    let file_b = fixture._dir.path().join("b.txt");
    std::fs::write(&file_a, "contents of a").unwrap();
    std::fs::write(&file_b, "contents of b").unwrap();

    fixture.mock.push_tool_call_turn(&[
        ("call_1", "read_file", &format!(r#"{{"path":"{}"}}"#, file_a.display())),
        ("call_2", "read_file", &format!(r#"{{"path":"{}"}}"#, file_b.display())),
    ]);
    fixture.mock.push_text_turn("两个文件都读完了");

    let mut receiver = fixture.wire.subscribe();
    fixture
        .engine
        .run_turn(&mut fixture.runtime, "读取两个文件")
        .await
        .unwrap();

    let kinds = drain(&mut receiver);
    assert_eq!(kinds.iter().filter(|k| *k == "tool_call").count(), 2);
    assert_eq!(kinds.iter().filter(|k| *k == "tool_result").count(), 2);

    // History contains both tool messages in call-id order.
    let tool_ids: Vec<&str> = fixture
        .runtime
        .history
        .iter()
        .filter_map(|m| m.tool_result_content())
        .map(|r| r.tool_call_id.as_str())
        .collect();
    assert_eq!(tool_ids, vec!["call_1", "call_2"]);

    // The next LLM turn saw both results.
    let requests = fixture.mock.requests();
    let results: Vec<&str> = requests[1]
        .messages
        .iter()
        .filter_map(|m| m.tool_result_content())
        .map(|r| r.content.as_str())
        .collect();
    assert_eq!(results, vec!["contents of a", "contents of b"]);
}

// Scenario C — max steps.
#[tokio::test]
async fn scenario_max_steps() {
    let mut agent = AgentSpec::default_main();
    agent.max_steps = 2;
    let agents = HashMap::from([(agent.name.clone(), Arc::new(agent))]);
    let mut fixture = fixture_with(EngineConfig::default(), Some(agents));

    let file = fixture._dir.path().join("loop.txt");
    std::fs::write(&file, "again").unwrap();
    let args = format!(r#"{{"path":"{}"}}"#, file.display());

    // The model keeps emitting tool calls.
    fixture.mock.push_tool_call_turn(&[("call_1", "read_file", &args)]);
    fixture.mock.push_tool_call_turn(&[("call_2", "read_file", &args)]);
    fixture.mock.push_tool_call_turn(&[("call_3", "read_file", &args)]);

    let mut receiver = fixture.wire.subscribe();
    let err = fixture
        .engine
        .run_turn(&mut fixture.runtime, "不停地读")
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::MaxStepsReached { max: 2 }));
    assert!(drain(&mut receiver).contains(&"step_interrupted".to_string()));

    let last = fixture.runtime.history.last().unwrap();
    assert_eq!(last.role, MessageRole::Assistant);
    assert_eq!(last.text(), Some("Max steps reached: 2"));
}

// Scenario D — sub-agent recursion.
#[tokio::test]
async fn scenario_subagent_recursion() {
    let main = AgentSpec::default_main();
    let mut design = AgentSpec::default_main();
    design.name = "design".to_string();
    let agents = HashMap::from([
        (main.name.clone(), Arc::new(main)),
        (design.name.clone(), Arc::new(design)),
    ]);
    let mut fixture = fixture_with(EngineConfig::default(), Some(agents));

    // Parent asks for a sub-agent, the nested engine answers, the parent
    // wraps up.
    fixture.mock.push_tool_call_turn(&[(
        "call_1",
        "task",
        r#"{"subagent":"design","description":"design REST API"}"#,
    )]);
    fixture.mock.push_text_turn("API 设计完成，共 5 个端点");
    fixture.mock.push_text_turn("子任务完成");

    let mut receiver = fixture.wire.subscribe();
    fixture
        .engine
        .run_turn(&mut fixture.runtime, "设计一个 REST API")
        .await
        .unwrap();

    // Parent history gained the structured restore block.
    let restore = fixture
        .runtime
        .history
        .iter()
        .filter_map(|m| m.tool_result_content())
        .find(|r| r.tool_call_id == "call_1")
        .unwrap();
    assert!(restore.content.contains("=== 父级上下文恢复 (深度: 1) ==="));
    assert!(restore.content.contains("子目标: design REST API"));
    assert!(restore.content.contains("子代理结果: API 设计完成，共 5 个端点"));

    // The nested run used the bounded prompt (role slice, no examples).
    let requests = fixture.mock.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[1].system.contains("已省略示例"));
    assert!(!requests[0].system.contains("已省略示例"));

    // The step counter reflects steps from both engines.
    assert_eq!(fixture.session.current_step(), 3);

    // The stack unwound with the recursion.
    assert!(fixture.runtime.parent_stack.lock().unwrap().is_empty());

    // Sub-agent wire traffic is tagged with depth > 0.
    let mut saw_nested_step = false;
    while let Some(msg) = receiver.try_recv() {
        if let WireMessage::StepBegin { depth: 1, .. } = msg.as_ref() {
            saw_nested_step = true;
        }
    }
    assert!(saw_nested_step);
}

// Scenario E — POST_TOOL_CALL hook with a file pattern.
#[tokio::test]
async fn scenario_file_pattern_hook() {
    setup_test_logging();
    let dir = TempDir::new().unwrap();
    let hook_log = dir.path().join("hook_log.txt");

    let hook = HookSpec::new("auto-format", jimi_core::HookEvent::PostToolCall)
        .with_tools(vec!["write_file".to_string()])
        .with_file_patterns(vec!["*.java".to_string()])
        .with_execution(HookExecution::script(&format!(
            "printf '%s\\n' \"${{MODIFIED_FILES}}\" >> {}",
            hook_log.display()
        )));
    let hooks = Arc::new(HookDispatcher::with_specs(HookRunner::new(), vec![hook]));

    let mock = Arc::new(MockProvider::new());
    let engine = Engine::builder()
        .llm(Arc::clone(&mock) as Arc<dyn LlmProvider>)
        .hooks(hooks)
        .build()
        .unwrap();

    let session = Arc::new(Session::new(dir.path()));
    let wire = Wire::new();
    let approval = Arc::new(ApprovalArbiter::new(wire.clone(), ApprovalPolicy::default()));
    approval.set_mode(ApprovalMode::Yolo);
    let mut runtime = engine
        .create_runtime("jimi", Arc::clone(&session), approval, wire)
        .unwrap();

    let java = dir.path().join("src").join("Foo.java");
    let txt = dir.path().join("src").join("bar.txt");
    mock.push_tool_call_turn(&[
        (
            "call_1",
            "write_file",
            &format!(r#"{{"path":"{}","content":"class Foo {{}}"}}"#, java.display()),
        ),
        (
            "call_2",
            "write_file",
            &format!(r#"{{"path":"{}","content":"plain"}}"#, txt.display()),
        ),
    ]);
    mock.push_text_turn("两个文件都写好了");

    engine.run_turn(&mut runtime, "写两个文件").await.unwrap();

    // The hook fired once, for the java file only.
    let log = std::fs::read_to_string(&hook_log).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("Foo.java"));
    assert!(!lines[0].contains("bar.txt"));
}

// Scenario F — cancellation mid-stream.
#[tokio::test]
async fn scenario_cancel_mid_stream() {
    let mut fixture = fixture();
    fixture.mock.push_hanging_script(vec![Ok(
        jimi_llm::StreamEvent::TextDelta("正在思考".to_string()),
    )]);

    let mut receiver = fixture.wire.subscribe();
    let session = Arc::clone(&fixture.session);
    let engine = Arc::clone(&fixture.engine);

    let cancel = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.cancel();
    });

    let started = std::time::Instant::now();
    let err = engine
        .run_turn(&mut fixture.runtime, "讲个很长的故事")
        .await
        .unwrap_err();
    cancel.await.unwrap();

    assert!(matches!(err, EngineError::RunCancelled));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(drain(&mut receiver).contains(&"step_interrupted".to_string()));

    // The session accepts new input after the flag is reset.
    fixture.mock.push_text_turn("新的回合");
    let outcome = fixture
        .engine
        .run_turn(&mut fixture.runtime, "继续")
        .await
        .unwrap();
    assert_eq!(outcome.final_text, "新的回合");
}

/// A read-only tool that sleeps far longer than any test runs.
struct SlowTool;

#[async_trait::async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "sleeps for a minute"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, _args: serde_json::Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("done".to_string())
    }
}

struct SlowToolProvider;

impl ToolProvider for SlowToolProvider {
    fn name(&self) -> &'static str {
        "slow-tools"
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![Arc::new(SlowTool)]
    }
}

// Scenario F (continued) — cancellation signals a dispatched tool future
// and gives up after the grace period.
#[tokio::test]
async fn scenario_cancel_during_tool_execution() {
    setup_test_logging();
    let dir = TempDir::new().unwrap();
    let mock = Arc::new(MockProvider::new());
    let engine = Engine::builder()
        .llm(Arc::clone(&mock) as Arc<dyn LlmProvider>)
        .tool_provider(Arc::new(SlowToolProvider))
        .config(EngineConfig {
            cancel_grace: Duration::from_millis(200),
            ..EngineConfig::default()
        })
        .build()
        .unwrap();

    let session = Arc::new(Session::new(dir.path()));
    let wire = Wire::new();
    let approval = Arc::new(ApprovalArbiter::new(wire.clone(), ApprovalPolicy::default()));
    let mut runtime = engine
        .create_runtime("jimi", Arc::clone(&session), approval, wire.clone())
        .unwrap();

    mock.push_tool_call_turn(&[("call_1", "slow", "{}")]);

    let mut receiver = wire.subscribe();
    let canceller = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            session.cancel();
        })
    };

    let started = std::time::Instant::now();
    let err = engine.run_turn(&mut runtime, "跑慢工具").await.unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, EngineError::RunCancelled));
    // Bounded by the cancel delay plus the grace period, with headroom.
    assert!(started.elapsed() < Duration::from_secs(2));

    // No tool message was appended after cancellation.
    assert!(
        runtime
            .history
            .iter()
            .all(|m| m.tool_result_content().is_none())
    );
    assert!(drain(&mut receiver).contains(&"step_interrupted".to_string()));
}

// Unknown tools become ERROR observations, not crashes.
#[tokio::test]
async fn unknown_tool_is_fed_back_as_error() {
    let mut fixture = fixture();
    fixture
        .mock
        .push_tool_call_turn(&[("call_1", "definitely_not_a_tool", "{}")]);
    fixture.mock.push_text_turn("我换个方式");

    fixture
        .engine
        .run_turn(&mut fixture.runtime, "试试看")
        .await
        .unwrap();

    let tool_msg = fixture
        .runtime
        .history
        .iter()
        .find_map(|m| m.tool_result_content())
        .unwrap();
    assert!(tool_msg.content.contains("Unknown tool"));
}

// Transient provider errors retry with backoff and then succeed.
#[tokio::test]
async fn transient_stream_error_is_retried() {
    let mut fixture = fixture_with(
        EngineConfig {
            retry_base_delay: Duration::from_millis(10),
            ..EngineConfig::default()
        },
        None,
    );
    fixture.mock.push_transient_error();
    fixture.mock.push_text_turn("恢复了");

    let outcome = fixture
        .engine
        .run_turn(&mut fixture.runtime, "你好")
        .await
        .unwrap();
    assert_eq!(outcome.final_text, "恢复了");
    assert_eq!(fixture.mock.requests().len(), 2);
}

// A PRE_TOOL_CALL hook veto becomes a REJECTED result without execution.
#[tokio::test]
async fn pre_tool_hook_veto_rejects_call() {
    setup_test_logging();
    let dir = TempDir::new().unwrap();
    let hook = HookSpec::new("no-writes", jimi_core::HookEvent::PreToolCall)
        .with_tools(vec!["write_file".to_string()])
        .with_execution(HookExecution::script("echo 'block: 禁止写入'"));
    let hooks = Arc::new(HookDispatcher::with_specs(HookRunner::new(), vec![hook]));

    let mock = Arc::new(MockProvider::new());
    let engine = Engine::builder()
        .llm(Arc::clone(&mock) as Arc<dyn LlmProvider>)
        .hooks(hooks)
        .build()
        .unwrap();

    let session = Arc::new(Session::new(dir.path()));
    let wire = Wire::new();
    let approval = Arc::new(ApprovalArbiter::new(wire.clone(), ApprovalPolicy::default()));
    approval.set_mode(ApprovalMode::Yolo);
    let mut runtime = engine
        .create_runtime("jimi", Arc::clone(&session), approval, wire)
        .unwrap();

    let target = dir.path().join("blocked.txt");
    mock.push_tool_call_turn(&[(
        "call_1",
        "write_file",
        &format!(r#"{{"path":"{}","content":"x"}}"#, target.display()),
    )]);
    mock.push_text_turn("明白了");

    engine.run_turn(&mut runtime, "写文件").await.unwrap();

    assert!(!target.exists());
    let tool_msg = runtime
        .history
        .iter()
        .find_map(|m| m.tool_result_content())
        .unwrap();
    assert!(tool_msg.content.contains("工具调用被用户拒绝"));
}

// Step numbers are monotonic across a run and the history file replays.
#[tokio::test]
async fn history_persists_and_steps_are_monotonic() {
    let mut fixture = fixture();
    fixture.mock.push_text_turn("第一回合");
    fixture
        .engine
        .run_turn(&mut fixture.runtime, "你好")
        .await
        .unwrap();

    fixture.mock.push_text_turn("第二回合");
    fixture
        .engine
        .run_turn(&mut fixture.runtime, "再来")
        .await
        .unwrap();

    assert_eq!(fixture.session.current_step(), 2);

    let replayed = jimi_engine::load_history(&fixture.session.history_file).unwrap();
    assert_eq!(replayed.len(), fixture.runtime.history.len());
    assert_eq!(replayed[0].text(), Some("你好"));
}

// ALLOW_ALWAYS covers later calls of the same action kind.
#[tokio::test]
async fn allow_always_skips_later_prompts() {
    let mut fixture = fixture();
    let first = fixture._dir.path().join("one.txt");
    let second = fixture._dir.path().join("two.txt");

    fixture.mock.push_tool_call_turn(&[(
        "call_1",
        "write_file",
        &format!(r#"{{"path":"{}","content":"1"}}"#, first.display()),
    )]);
    fixture.mock.push_tool_call_turn(&[(
        "call_2",
        "write_file",
        &format!(r#"{{"path":"{}","content":"2"}}"#, second.display()),
    )]);
    fixture.mock.push_text_turn("两个都写完了");

    auto_respond(
        &fixture.wire,
        Arc::clone(&fixture.approval),
        Decision::AllowAlways,
    );

    fixture
        .engine
        .run_turn(&mut fixture.runtime, "写两个文件")
        .await
        .unwrap();

    assert!(first.exists());
    assert!(second.exists());

    // Only the first call needed a prompt; the results confirm both ran.
    let ok_results = fixture
        .runtime
        .history
        .iter()
        .filter_map(|m| m.tool_result_content())
        .filter(|r| r.content.contains("Wrote"))
        .count();
    assert_eq!(ok_results, 2);
}

// Wire ordering: StepBegin precedes the step's tool traffic, and each
// ToolResult follows its ToolCall.
#[tokio::test]
async fn wire_ordering_within_a_step() {
    let mut fixture = fixture();
    let file = fixture._dir.path().join("a.txt");
    std::fs::write(&file, "x").unwrap();

    fixture.mock.push_tool_call_turn(&[(
        "call_1",
        "read_file",
        &format!(r#"{{"path":"{}"}}"#, file.display()),
    )]);
    fixture.mock.push_text_turn("读完了");

    let mut receiver = fixture.wire.subscribe();
    fixture
        .engine
        .run_turn(&mut fixture.runtime, "读文件")
        .await
        .unwrap();

    let kinds = drain(&mut receiver);
    let step_begin = kinds.iter().position(|k| k == "step_begin").unwrap();
    let tool_call = kinds.iter().position(|k| k == "tool_call").unwrap();
    let tool_result = kinds.iter().position(|k| k == "tool_result").unwrap();
    assert!(step_begin < tool_call);
    assert!(tool_call < tool_result);
}

// Session boundary hooks fire with the agent name in the environment.
#[tokio::test]
async fn session_hooks_fire_at_boundaries() {
    setup_test_logging();
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("session_events.txt");

    let start = HookSpec::new("session-start", jimi_core::HookEvent::OnSessionStart)
        .with_execution(HookExecution::script(&format!(
            "printf 'start %s\\n' \"$JIMI_AGENT_NAME\" >> {}",
            marker.display()
        )));
    let end = HookSpec::new("session-end", jimi_core::HookEvent::OnSessionEnd)
        .with_execution(HookExecution::script(&format!(
            "printf 'end %s\\n' \"$JIMI_AGENT_NAME\" >> {}",
            marker.display()
        )));
    let hooks = Arc::new(HookDispatcher::with_specs(HookRunner::new(), vec![start, end]));

    let mock = Arc::new(MockProvider::new());
    let engine = Engine::builder()
        .llm(Arc::clone(&mock) as Arc<dyn LlmProvider>)
        .hooks(hooks)
        .build()
        .unwrap();

    let session = Arc::new(Session::new(dir.path()));
    let wire = Wire::new();
    let approval = Arc::new(ApprovalArbiter::new(wire.clone(), ApprovalPolicy::default()));
    let mut runtime = engine
        .create_runtime("jimi", Arc::clone(&session), approval, wire)
        .unwrap();

    engine.fire_session_start(&runtime).await;
    mock.push_text_turn("你好");
    engine.run_turn(&mut runtime, "你好").await.unwrap();
    engine.fire_session_end(&runtime).await;

    let log = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(log, "start jimi\nend jimi\n");
}

// Sub-agent depth limit returns an error result to the caller tool.
#[tokio::test]
async fn depth_limit_stops_recursion() {
    let mut fixture = fixture_with(
        EngineConfig {
            max_depth: 1,
            ..EngineConfig::default()
        },
        None,
    );

    // Parent spawns a child; the child tries to spawn again and is denied.
    fixture.mock.push_tool_call_turn(&[(
        "call_1",
        "task",
        r#"{"description":"first level"}"#,
    )]);
    fixture.mock.push_tool_call_turn(&[(
        "call_2",
        "task",
        r#"{"description":"second level"}"#,
    )]);
    fixture.mock.push_text_turn("到底了");
    fixture.mock.push_text_turn("完成");

    fixture
        .engine
        .run_turn(&mut fixture.runtime, "递归下去")
        .await
        .unwrap();

    // Some tool result along the way carries the depth error.
    let requests = fixture.mock.requests();
    let saw_depth_error = requests.iter().any(|r| {
        r.messages.iter().any(|m| {
            m.tool_result_content()
                .is_some_and(|t| t.content.contains("maximum sub-agent depth"))
        })
    });
    assert!(saw_depth_error);
}
