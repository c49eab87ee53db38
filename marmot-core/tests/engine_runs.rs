//! End-to-end engine behavior against a scripted model client.
//!
//! These tests drive full runs through the executor: plain completions,
//! mixed tool batches with delegation pauses, resume-from-checkpoint,
//! step limits, and the model retry path.

use async_trait::async_trait;
use indexmap::IndexMap;
use marmot_core::{
    Checkpoint, CheckpointId, ContentPart, EventEnvelope, Executor, Expert, GenerateTextRequest,
    GeneratedMessage, InitGate, JobId, ListenerError, Message, ModelClient, ModelError, RunError,
    RunEventListener, RunId, RunInput, RunSetting, RunStatus, RunStore, SkillConfig, SkillError,
    SkillKind, SkillManager, ToolCall, ToolDef, ToolOutput, Usage,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Model client that replays a scripted list of responses
struct ScriptedClient {
    responses: Mutex<Vec<Result<GeneratedMessage, ModelError>>>,
}

impl ScriptedClient {
    fn new(responses: Vec<Result<GeneratedMessage, ModelError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
        })
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn generate_text(
        &self,
        _request: &GenerateTextRequest,
    ) -> Result<GeneratedMessage, ModelError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ModelError::fatal("script exhausted"));
        }
        responses.remove(0)
    }

    fn provider(&self) -> &'static str {
        "scripted"
    }
}

fn text_response(text: &str) -> Result<GeneratedMessage, ModelError> {
    Ok(GeneratedMessage {
        text: text.to_string(),
        tool_calls: vec![],
        usage: Usage {
            input_tokens: 10,
            output_tokens: 20,
            reasoning_tokens: 0,
            cached_input_tokens: 0,
            total_tokens: 30,
        },
        context_window_size: Some(200_000),
    })
}

fn tool_response(text: &str, calls: Vec<ToolCall>) -> Result<GeneratedMessage, ModelError> {
    Ok(GeneratedMessage {
        text: text.to_string(),
        tool_calls: calls,
        usage: Usage {
            input_tokens: 15,
            output_tokens: 10,
            reasoning_tokens: 0,
            cached_input_tokens: 0,
            total_tokens: 25,
        },
        context_window_size: Some(200_000),
    })
}

/// Remote skill manager stub serving a `think` tool
struct ThinkManager {
    gate: InitGate,
    calls: Mutex<Vec<String>>,
}

impl ThinkManager {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: InitGate::new(),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SkillManager for ThinkManager {
    fn kind(&self) -> SkillKind {
        SkillKind::Remote
    }

    fn name(&self) -> &str {
        "thinking"
    }

    async fn init(&self) -> Result<(), SkillError> {
        self.gate.run_init(|| async { Ok(()) }).await
    }

    async fn tool_definitions(&self) -> Result<Vec<ToolDef>, SkillError> {
        self.gate.wait_ready().await?;
        Ok(vec![ToolDef {
            name: "think".to_string(),
            description: "Think about a topic".to_string(),
            input_schema: json!({"type": "object", "properties": {"topic": {"type": "string"}}}),
        }])
    }

    async fn call_tool(&self, name: &str, args: &Value) -> Result<ToolOutput, SkillError> {
        self.calls.lock().unwrap().push(name.to_string());
        let topic = args.get("topic").and_then(Value::as_str).unwrap_or("?");
        Ok(ToolOutput::text(format!("thought about {topic}")))
    }

    async fn close(&self) -> Result<(), SkillError> {
        Ok(())
    }
}

/// Listener recording every event kind in arrival order
#[derive(Default)]
struct Recorder {
    kinds: Mutex<Vec<String>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn kinds(&self) -> Vec<String> {
        self.kinds.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunEventListener for Recorder {
    async fn on_event(&self, envelope: &EventEnvelope) -> Result<(), ListenerError> {
        self.kinds.lock().unwrap().push(envelope.event.kind().to_string());
        Ok(())
    }
}

/// Minimal in-test store
#[derive(Default)]
struct TestStore {
    checkpoints: Mutex<HashMap<CheckpointId, Checkpoint>>,
    events: Mutex<Vec<EventEnvelope>>,
}

impl TestStore {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RunStore for TestStore {
    async fn store_checkpoint(
        &self,
        _job_id: &JobId,
        checkpoint: &Checkpoint,
    ) -> Result<(), RunError> {
        self.checkpoints
            .lock()
            .unwrap()
            .insert(checkpoint.id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn retrieve_checkpoint(
        &self,
        _job_id: &JobId,
        checkpoint_id: &CheckpointId,
    ) -> Result<Option<Checkpoint>, RunError> {
        Ok(self.checkpoints.lock().unwrap().get(checkpoint_id).cloned())
    }

    async fn store_event(&self, envelope: &EventEnvelope) -> Result<(), RunError> {
        self.events.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn math_expert() -> Expert {
    Expert {
        key: "math-expert".to_string(),
        name: "Math Expert".to_string(),
        version: "1.0.0".to_string(),
        instruction: "You solve math problems.".to_string(),
        skills: IndexMap::new(),
        delegates: vec![],
        tags: vec![],
    }
}

fn coordinator() -> Expert {
    let mut skills = IndexMap::new();
    skills.insert(
        "human".to_string(),
        SkillConfig::Interactive {
            tools: vec![ToolDef {
                name: "ask_user".to_string(),
                description: "Ask the user a question".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"question": {"type": "string"}},
                    "required": ["question"]
                }),
            }],
        },
    );
    Expert {
        key: "coordinator".to_string(),
        name: "Coordinator".to_string(),
        version: "1.0.0".to_string(),
        instruction: "You coordinate work and delegate math.".to_string(),
        skills,
        delegates: vec!["math-expert".to_string()],
        tags: vec!["test".to_string()],
    }
}

fn setting(input: RunInput, max_steps: u32, max_retries: u32) -> RunSetting {
    let mut experts = IndexMap::new();
    experts.insert("coordinator".to_string(), coordinator());
    experts.insert("math-expert".to_string(), math_expert());
    RunSetting {
        job_id: JobId::new(),
        run_id: RunId::new(),
        expert_key: "coordinator".to_string(),
        experts,
        model: "test-model".to_string(),
        provider_config: Value::Null,
        temperature: Some(0.2),
        max_steps,
        max_retries,
        timeout: Duration::from_secs(5),
        input,
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plain_text_run_completes_in_one_step() {
    let recorder = Recorder::new();
    let executor = Executor::builder(
        setting(RunInput::text("Say hello"), 10, 3),
        ScriptedClient::new(vec![text_response("Hello!")]),
        TestStore::new(),
    )
    .listener(recorder.clone())
    .build()
    .unwrap();

    let checkpoint = executor.run(None).await.unwrap();

    assert_eq!(checkpoint.status, RunStatus::Completed);
    assert_eq!(checkpoint.step_number, 1);
    assert!(checkpoint.usage.total_tokens > 0);
    assert_eq!(checkpoint.last_assistant_text(), Some("Hello!"));
    assert_eq!(recorder.kinds(), vec!["start_run", "complete_run"]);

    // History: instruction, user input, final answer
    assert_eq!(checkpoint.messages.len(), 3);
    assert!(matches!(
        &checkpoint.messages[0],
        Message::System { content } if content.contains("coordinate")
    ));
}

#[tokio::test]
async fn remote_tool_loop_reaches_completion() {
    let think = ThinkManager::new();
    let recorder = Recorder::new();
    let executor = Executor::builder(
        setting(RunInput::text("Think, then answer"), 10, 3),
        ScriptedClient::new(vec![
            tool_response(
                "Let me think.",
                vec![ToolCall::new("tc_1", "think", json!({"topic": "greetings"}))],
            ),
            text_response("Done thinking: hello."),
        ]),
        TestStore::new(),
    )
    .skill_manager(think.clone())
    .listener(recorder.clone())
    .build()
    .unwrap();

    let checkpoint = executor.run(None).await.unwrap();

    assert_eq!(checkpoint.status, RunStatus::Completed);
    assert_eq!(checkpoint.step_number, 2);
    assert_eq!(think.calls.lock().unwrap().len(), 1);
    assert_eq!(
        recorder.kinds(),
        vec![
            "start_run",
            "call_tools",
            "resolve_tool_results",
            "finish_tool_call",
            "continue_to_next_step",
            "complete_run",
        ]
    );

    // The tool result message carries the think output
    let tool_results = checkpoint.messages.iter().find_map(|m| match m {
        Message::ToolResults { results } => Some(results),
        _ => None,
    });
    let results = tool_results.expect("tool results folded into history");
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].parts[0].as_text(),
        Some("thought about greetings")
    );
}

#[tokio::test]
async fn mixed_batch_pauses_for_delegate_with_partials_conserved() {
    let recorder = Recorder::new();
    let executor = Executor::builder(
        setting(RunInput::text("Work on this"), 10, 3),
        ScriptedClient::new(vec![tool_response(
            "I need to think and delegate.",
            vec![
                ToolCall::new("tc_1", "think", json!({"topic": "the problem"})),
                ToolCall::new("tc_2", "think", json!({"topic": "the approach"})),
                ToolCall::new("tc_3", "math-expert", json!({"query": "17 * 23"})),
            ],
        )]),
        TestStore::new(),
    )
    .skill_manager(ThinkManager::new())
    .listener(recorder.clone())
    .build()
    .unwrap();

    let checkpoint = executor.run(None).await.unwrap();

    assert_eq!(checkpoint.status, RunStatus::StoppedByDelegate);
    assert_eq!(checkpoint.partial_tool_results.len(), 2);
    assert_eq!(checkpoint.pending_tool_calls.len(), 1);
    assert_eq!(checkpoint.pending_tool_calls[0].id, "tc_3");

    let delegate_to = checkpoint.delegate_to.as_ref().expect("delegate pointer set");
    assert_eq!(delegate_to.expert.key, "math-expert");
    assert_eq!(delegate_to.tool_call_id, "tc_3");
    assert_eq!(delegate_to.query, "17 * 23");

    assert_eq!(
        recorder.kinds(),
        vec![
            "start_run",
            "call_tools",
            "call_delegate",
            "stop_run_by_delegate",
        ]
    );
}

#[tokio::test]
async fn paused_run_resumes_and_completes() {
    // First leg: pause on the delegate with one remote partial collected.
    let first_setting = setting(RunInput::text("Work on this"), 10, 3);
    let job_id = first_setting.job_id.clone();
    let run_id = first_setting.run_id.clone();
    let executor = Executor::builder(
        first_setting,
        ScriptedClient::new(vec![tool_response(
            "Thinking and delegating.",
            vec![
                ToolCall::new("tc_1", "think", json!({"topic": "the problem"})),
                ToolCall::new("tc_2", "math-expert", json!({"query": "17 * 23"})),
            ],
        )]),
        TestStore::new(),
    )
    .skill_manager(ThinkManager::new())
    .build()
    .unwrap();
    let paused = executor.run(None).await.unwrap();
    assert_eq!(paused.status, RunStatus::StoppedByDelegate);

    // Second leg: feed the delegate's answer back in.
    let mut resume_setting = setting(
        RunInput::tool_answer("tc_2", vec![ContentPart::text("391")]),
        10,
        3,
    );
    resume_setting.job_id = job_id;
    resume_setting.run_id = run_id;

    let recorder = Recorder::new();
    let executor = Executor::builder(
        resume_setting,
        ScriptedClient::new(vec![text_response("17 * 23 = 391.")]),
        TestStore::new(),
    )
    .skill_manager(ThinkManager::new())
    .listener(recorder.clone())
    .build()
    .unwrap();

    let finished = executor.run(Some(paused)).await.unwrap();

    assert_eq!(finished.status, RunStatus::Completed);
    assert!(finished.pending_tool_calls.is_empty());
    assert!(finished.partial_tool_results.is_empty());
    assert_eq!(finished.last_assistant_text(), Some("17 * 23 = 391."));
    assert_eq!(
        recorder.kinds(),
        vec![
            "resume_tool_calls",
            "finish_tool_call",
            "continue_to_next_step",
            "complete_run",
        ]
    );

    // The folded results preserve the model's request order: think first,
    // then the delegate's answer.
    let results = finished
        .messages
        .iter()
        .find_map(|m| match m {
            Message::ToolResults { results } => Some(results),
            _ => None,
        })
        .expect("tool results in history");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].tool_call_id, "tc_1");
    assert_eq!(results[1].tool_call_id, "tc_2");
    assert_eq!(results[1].parts[0].as_text(), Some("391"));
}

#[tokio::test]
async fn interactive_pause_and_resume() {
    let recorder = Recorder::new();
    let first_setting = setting(RunInput::text("Check with the user"), 10, 3);
    let run_id = first_setting.run_id.clone();
    let executor = Executor::builder(
        first_setting,
        ScriptedClient::new(vec![tool_response(
            "I should ask.",
            vec![ToolCall::new(
                "tc_1",
                "ask_user",
                json!({"question": "Proceed with the plan?"}),
            )],
        )]),
        TestStore::new(),
    )
    .listener(recorder.clone())
    .build()
    .unwrap();

    let paused = executor.run(None).await.unwrap();
    assert_eq!(paused.status, RunStatus::StoppedByInteractiveTool);
    assert_eq!(paused.pending_tool_calls.len(), 1);
    assert!(paused.delegate_to.is_none());
    assert_eq!(
        recorder.kinds(),
        vec![
            "start_run",
            "call_tools",
            "call_interactive_tool",
            "stop_run_by_interactive_tool",
        ]
    );

    let mut resume_setting = setting(
        RunInput::tool_answer("tc_1", vec![ContentPart::text("Yes, go ahead")]),
        10,
        3,
    );
    resume_setting.run_id = run_id;
    let executor = Executor::builder(
        resume_setting,
        ScriptedClient::new(vec![text_response("Proceeding as confirmed.")]),
        TestStore::new(),
    )
    .build()
    .unwrap();

    let finished = executor.run(Some(paused)).await.unwrap();
    assert_eq!(finished.status, RunStatus::Completed);
    assert!(finished.pending_tool_calls.is_empty());
}

#[tokio::test]
async fn double_pause_resumes_one_at_a_time() {
    // One batch requesting both a delegate and an interactive answer: the
    // delegate pauses first, and resuming it pauses again on the
    // interactive call.
    let first_setting = setting(RunInput::text("Do both"), 10, 3);
    let run_id = first_setting.run_id.clone();
    let executor = Executor::builder(
        first_setting,
        ScriptedClient::new(vec![tool_response(
            "Delegating and asking.",
            vec![
                ToolCall::new("tc_1", "math-expert", json!({"query": "6 * 7"})),
                ToolCall::new("tc_2", "ask_user", json!({"question": "Happy with 42?"})),
            ],
        )]),
        TestStore::new(),
    )
    .build()
    .unwrap();
    let paused = executor.run(None).await.unwrap();
    assert_eq!(paused.status, RunStatus::StoppedByDelegate);
    assert_eq!(paused.pending_tool_calls.len(), 2);

    let mut resume_setting = setting(
        RunInput::tool_answer("tc_1", vec![ContentPart::text("42")]),
        10,
        3,
    );
    resume_setting.run_id = run_id.clone();
    let recorder = Recorder::new();
    let executor = Executor::builder(resume_setting, ScriptedClient::new(vec![]), TestStore::new())
        .listener(recorder.clone())
        .build()
        .unwrap();
    let paused_again = executor.run(Some(paused)).await.unwrap();

    assert_eq!(paused_again.status, RunStatus::StoppedByInteractiveTool);
    assert_eq!(paused_again.pending_tool_calls.len(), 1);
    assert_eq!(paused_again.pending_tool_calls[0].id, "tc_2");
    assert_eq!(paused_again.partial_tool_results.len(), 1);
    assert_eq!(
        recorder.kinds(),
        vec![
            "resume_tool_calls",
            "call_interactive_tool",
            "stop_run_by_interactive_tool",
        ]
    );

    let mut final_setting = setting(
        RunInput::tool_answer("tc_2", vec![ContentPart::text("Yes")]),
        10,
        3,
    );
    final_setting.run_id = run_id;
    let executor = Executor::builder(
        final_setting,
        ScriptedClient::new(vec![text_response("All done: 42.")]),
        TestStore::new(),
    )
    .build()
    .unwrap();
    let finished = executor.run(Some(paused_again)).await.unwrap();
    assert_eq!(finished.status, RunStatus::Completed);
    assert!(finished.pending_tool_calls.is_empty());
    assert!(finished.partial_tool_results.is_empty());
}

#[tokio::test]
async fn step_limit_stops_regardless_of_requests() {
    let recorder = Recorder::new();
    let executor = Executor::builder(
        setting(RunInput::text("Loop forever"), 1, 3),
        ScriptedClient::new(vec![
            tool_response(
                "Calling a tool.",
                vec![ToolCall::new("tc_1", "think", json!({"topic": "round 1"}))],
            ),
            // Would request more tools, but the ceiling fires first
            tool_response(
                "More tools!",
                vec![ToolCall::new("tc_2", "think", json!({"topic": "round 2"}))],
            ),
        ]),
        TestStore::new(),
    )
    .skill_manager(ThinkManager::new())
    .listener(recorder.clone())
    .build()
    .unwrap();

    let checkpoint = executor.run(None).await.unwrap();

    assert_eq!(checkpoint.status, RunStatus::StoppedByExceededMaxSteps);
    assert_eq!(checkpoint.step_number, 2); // the attempted step N+1
    assert_eq!(
        recorder.kinds(),
        vec![
            "start_run",
            "call_tools",
            "resolve_tool_results",
            "finish_tool_call",
            "stop_run_by_exceeded_max_steps",
        ]
    );
}

#[tokio::test]
async fn transient_model_failure_retries_with_context() {
    let recorder = Recorder::new();
    let executor = Executor::builder(
        setting(RunInput::text("Say hello"), 10, 3),
        ScriptedClient::new(vec![
            Err(ModelError::retryable("rate limited")),
            text_response("Hello after retry!"),
        ]),
        TestStore::new(),
    )
    .listener(recorder.clone())
    .build()
    .unwrap();

    let checkpoint = executor.run(None).await.unwrap();

    assert_eq!(checkpoint.status, RunStatus::Completed);
    assert_eq!(recorder.kinds(), vec!["start_run", "retry", "complete_run"]);

    // The failure is described in history so the retried call has context
    assert!(checkpoint.messages.iter().any(|m| matches!(
        m,
        Message::System { content } if content.contains("rate limited")
    )));
}

#[tokio::test]
async fn exhausted_retries_stop_with_error_status() {
    let recorder = Recorder::new();
    let executor = Executor::builder(
        setting(RunInput::text("Say hello"), 10, 1),
        ScriptedClient::new(vec![
            Err(ModelError::retryable("rate limited")),
            Err(ModelError::retryable("rate limited again")),
        ]),
        TestStore::new(),
    )
    .listener(recorder.clone())
    .build()
    .unwrap();

    // A permanently failing model is a terminal checkpoint, not an Err
    let checkpoint = executor.run(None).await.unwrap();
    assert_eq!(checkpoint.status, RunStatus::StoppedByError);
    assert_eq!(
        recorder.kinds(),
        vec!["start_run", "retry", "stop_run_by_error"]
    );
}

#[tokio::test]
async fn fatal_model_failure_skips_retries() {
    let executor = Executor::builder(
        setting(RunInput::text("Say hello"), 10, 3),
        ScriptedClient::new(vec![Err(ModelError::fatal("invalid api key"))]),
        TestStore::new(),
    )
    .build()
    .unwrap();

    let checkpoint = executor.run(None).await.unwrap();
    assert_eq!(checkpoint.status, RunStatus::StoppedByError);
}

#[tokio::test]
async fn unknown_tool_is_a_wiring_error() {
    let executor = Executor::builder(
        setting(RunInput::text("Use a ghost tool"), 10, 3),
        ScriptedClient::new(vec![tool_response(
            "Calling something undeclared.",
            vec![ToolCall::new("tc_1", "ghost", json!({}))],
        )]),
        TestStore::new(),
    )
    .build()
    .unwrap();

    let err = executor.run(None).await.unwrap_err();
    assert!(matches!(err, RunError::ToolNotFound { name } if name == "ghost"));
}

#[tokio::test]
async fn continuation_predicate_stops_between_steps() {
    let executor = Executor::builder(
        setting(RunInput::text("Keep going"), 10, 3),
        ScriptedClient::new(vec![
            tool_response(
                "Step one.",
                vec![ToolCall::new("tc_1", "think", json!({"topic": "one"}))],
            ),
            text_response("Never generated."),
        ]),
        TestStore::new(),
    )
    .skill_manager(ThinkManager::new())
    .continuation(|_, _, _| false)
    .build()
    .unwrap();

    let checkpoint = executor.run(None).await.unwrap();

    // Stopped cooperatively after the first completed step, before the next
    // generation.
    assert_eq!(checkpoint.status, RunStatus::Running);
    assert_eq!(checkpoint.step_number, 2);
    assert!(checkpoint.last_assistant_text().is_some());
}

#[tokio::test]
async fn missing_delegate_fails_at_build_time() {
    let mut bad = setting(RunInput::text("hi"), 10, 3);
    let _ = bad.experts.shift_remove("math-expert");

    let err = Executor::builder(bad, ScriptedClient::new(vec![]), TestStore::new())
        .build()
        .unwrap_err();
    assert!(matches!(err, RunError::DelegateNotResolved { .. }));
}

#[tokio::test]
async fn follow_up_continues_a_completed_run() {
    let first_setting = setting(RunInput::text("Say hello"), 10, 3);
    let run_id = first_setting.run_id.clone();
    let executor = Executor::builder(
        first_setting,
        ScriptedClient::new(vec![text_response("Hello!")]),
        TestStore::new(),
    )
    .build()
    .unwrap();
    let completed = executor.run(None).await.unwrap();
    assert_eq!(completed.status, RunStatus::Completed);

    let mut follow_up = setting(RunInput::text("Say it again"), 10, 3);
    follow_up.run_id = run_id;
    let executor = Executor::builder(
        follow_up,
        ScriptedClient::new(vec![text_response("Hello again!")]),
        TestStore::new(),
    )
    .build()
    .unwrap();

    let continued = executor.run(Some(completed)).await.unwrap();
    assert_eq!(continued.status, RunStatus::Completed);
    assert_eq!(continued.last_assistant_text(), Some("Hello again!"));
    // Both exchanges live in one history
    let user_turns = continued
        .messages
        .iter()
        .filter(|m| matches!(m, Message::User { .. }))
        .count();
    assert_eq!(user_turns, 2);
}

#[tokio::test]
async fn events_are_persisted_with_checkpoints() {
    let store = TestStore::new();
    let executor = Executor::builder(
        setting(RunInput::text("Say hello"), 10, 3),
        ScriptedClient::new(vec![text_response("Hello!")]),
        store.clone(),
    )
    .build()
    .unwrap();

    let checkpoint = executor.run(None).await.unwrap();

    let events = store.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event.kind(), "start_run");
    assert_eq!(events[1].event.kind(), "complete_run");

    // The final checkpoint is durable and addressable by id
    let stored = store.checkpoints.lock().unwrap();
    assert!(stored.contains_key(&checkpoint.id));
}
