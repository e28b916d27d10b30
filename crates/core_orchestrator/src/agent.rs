use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use core_types::{
    ModelAdapter, ServiceError, ToolSpec, UnifiedEvent, UnifiedGenerateRequest, UnifiedMessage,
};
use futures::StreamExt;
use tracing::{debug, warn};

pub const STUDY_ASSISTANT_PROMPT: &str = "You are a study assistant for course textbooks and lecture notes. \
Answer using the passages returned by the `retrieve` tool. \
When you use a passage, cite its source file, section and page number. \
If the knowledge base has nothing relevant, say so plainly. \
Only use `http_request` when it is available and the course material does not cover the question.";

/// Executes tool calls requested by the model.
#[async_trait]
pub trait ToolRuntime: Send + Sync {
    fn specs(&self) -> Vec<ToolSpec>;
    async fn call_tool(&self, name: &str, arguments_json: &str) -> Result<String>;
}

/// Everything one agent run produced, in order.
#[derive(Debug, Default)]
pub struct AgentRun {
    pub events: Vec<UnifiedEvent>,
    pub answer: String,
}

impl AgentRun {
    /// The final answer, or the first failure the model loop reported.
    pub fn into_answer(self) -> Result<String> {
        let failure = self.events.into_iter().find_map(|event| match event {
            UnifiedEvent::Failed { code, message, .. } => Some(ServiceError::new(code, message)),
            _ => None,
        });
        match failure {
            Some(err) => Err(err.into()),
            None => Ok(self.answer),
        }
    }
}

pub struct Orchestrator {
    model: Arc<dyn ModelAdapter>,
    tools: Arc<dyn ToolRuntime>,
    max_rounds: usize,
    max_tokens: Option<u32>,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn ModelAdapter>, tools: Arc<dyn ToolRuntime>) -> Self {
        Self {
            model,
            tools,
            max_rounds: 4,
            max_tokens: None,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub async fn run(&self, model_id: &str, question: &str) -> Result<AgentRun> {
        let mut request = UnifiedGenerateRequest {
            model: model_id.to_string(),
            system: STUDY_ASSISTANT_PROMPT.to_string(),
            messages: vec![UnifiedMessage::user(question)],
            tools: self.tools.specs(),
            max_tokens: self.max_tokens,
        };
        let mut run = AgentRun::default();

        for round in 0..self.max_rounds {
            let stream = self.model.generate(request.clone()).await?;
            futures::pin_mut!(stream);

            let mut round_text = String::new();
            let mut pending_calls = Vec::<(String, String, String)>::new();
            while let Some(item) = stream.next().await {
                let event = item?;
                match &event {
                    UnifiedEvent::TextDelta { text } => round_text.push_str(text),
                    UnifiedEvent::ToolCallRequested {
                        call_id,
                        name,
                        arguments_json,
                    } => {
                        pending_calls.push((call_id.clone(), name.clone(), arguments_json.clone()));
                    }
                    _ => {}
                }
                run.events.push(event);
            }
            run.answer = round_text.clone();

            if pending_calls.is_empty() {
                break;
            }
            debug!(round, calls = pending_calls.len(), "model requested tools");

            request.messages.push(UnifiedMessage::assistant(round_text));
            for (call_id, name, arguments_json) in &pending_calls {
                request
                    .messages
                    .push(UnifiedMessage::tool_call(call_id, name, arguments_json));
            }

            for (call_id, name, arguments_json) in pending_calls {
                let (output, is_error) = match self.tools.call_tool(&name, &arguments_json).await {
                    Ok(output) => (output, false),
                    Err(err) => {
                        warn!(tool = %name, error = %err, "tool call failed");
                        (format!("{err:#}"), true)
                    }
                };
                run.events.push(UnifiedEvent::ToolCallResult {
                    call_id: call_id.clone(),
                    output: output.clone(),
                    is_error,
                });
                request
                    .messages
                    .push(UnifiedMessage::tool_result(call_id, output, is_error));
            }

            if round + 1 == self.max_rounds {
                run.events.push(UnifiedEvent::Failed {
                    code: "max_tool_rounds".to_string(),
                    message: format!(
                        "the model was still calling tools after {} rounds",
                        self.max_rounds
                    ),
                    retriable: false,
                });
            }
        }

        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use core_types::{UnifiedEventStream, UnifiedRole};
    use parking_lot::Mutex;

    use super::*;

    /// Replays one scripted round per `generate` call and records requests.
    struct ScriptedModel {
        rounds: Mutex<Vec<Vec<UnifiedEvent>>>,
        requests: Mutex<Vec<UnifiedGenerateRequest>>,
    }

    impl ScriptedModel {
        fn new(mut rounds: Vec<Vec<UnifiedEvent>>) -> Arc<Self> {
            rounds.reverse();
            Arc::new(Self {
                rounds: Mutex::new(rounds),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ModelAdapter for ScriptedModel {
        async fn generate(&self, request: UnifiedGenerateRequest) -> Result<UnifiedEventStream> {
            self.requests.lock().push(request);
            let events = self.rounds.lock().pop().unwrap_or_default();
            Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
        }
    }

    struct EchoTools;

    #[async_trait]
    impl ToolRuntime for EchoTools {
        fn specs(&self) -> Vec<ToolSpec> {
            vec![ToolSpec {
                name: "retrieve".to_string(),
                description: "echo".to_string(),
                input_schema: serde_json::json!({ "type": "object" }),
            }]
        }

        async fn call_tool(&self, name: &str, arguments_json: &str) -> Result<String> {
            if name == "retrieve" {
                Ok(format!("passages for {arguments_json}"))
            } else {
                anyhow::bail!("tool `{name}` is not available")
            }
        }
    }

    fn text(text: &str) -> UnifiedEvent {
        UnifiedEvent::TextDelta {
            text: text.to_string(),
        }
    }

    fn call(id: &str, name: &str) -> UnifiedEvent {
        UnifiedEvent::ToolCallRequested {
            call_id: id.to_string(),
            name: name.to_string(),
            arguments_json: r#"{"text":"scheduling"}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn feeds_tool_results_back_and_returns_final_text() {
        let model = ScriptedModel::new(vec![
            vec![text("Searching."), call("c1", "retrieve"), UnifiedEvent::Completed],
            vec![text("Round robin (os.pdf p.12)."), UnifiedEvent::Completed],
        ]);
        let orchestrator = Orchestrator::new(model.clone(), Arc::new(EchoTools));

        let answer = orchestrator
            .run("model", "what is scheduling?")
            .await
            .expect("run")
            .into_answer()
            .expect("answer");
        assert_eq!(answer, "Round robin (os.pdf p.12).");

        let requests = model.requests.lock();
        assert_eq!(requests.len(), 2);
        let second = &requests[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[2].tool_name.as_deref(), Some("retrieve"));
        assert_eq!(second[3].role, UnifiedRole::Tool);
        assert!(second[3].content.contains("scheduling"));
        assert!(!second[3].is_error);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_the_model_as_an_error() {
        let model = ScriptedModel::new(vec![
            vec![call("c1", "http_request"), UnifiedEvent::Completed],
            vec![text("I can only use the course material."), UnifiedEvent::Completed],
        ]);
        let orchestrator = Orchestrator::new(model.clone(), Arc::new(EchoTools));

        let run = orchestrator.run("model", "latest news?").await.expect("run");
        assert!(run.events.iter().any(|e| matches!(
            e,
            UnifiedEvent::ToolCallResult { is_error: true, .. }
        )));
        assert_eq!(
            run.into_answer().expect("answer"),
            "I can only use the course material."
        );
    }

    #[tokio::test]
    async fn answer_text_is_returned_verbatim() {
        let model = ScriptedModel::new(vec![vec![
            text("  - step one\n"),
            text("  - step two\n"),
            UnifiedEvent::Completed,
        ]]);
        let orchestrator = Orchestrator::new(model, Arc::new(EchoTools));

        let answer = orchestrator
            .run("model", "list the steps")
            .await
            .expect("run")
            .into_answer()
            .expect("answer");
        assert_eq!(answer, "  - step one\n  - step two\n");
    }

    #[tokio::test]
    async fn stops_after_max_rounds() {
        let model = ScriptedModel::new(vec![
            vec![call("c1", "retrieve"), UnifiedEvent::Completed],
            vec![call("c2", "retrieve"), UnifiedEvent::Completed],
            vec![text("never reached"), UnifiedEvent::Completed],
        ]);
        let orchestrator = Orchestrator::new(model.clone(), Arc::new(EchoTools)).with_max_rounds(2);

        let err = orchestrator
            .run("model", "loop")
            .await
            .expect("run")
            .into_answer()
            .expect_err("round limit");
        let service = err.downcast_ref::<ServiceError>().expect("service error");
        assert_eq!(service.code, "max_tool_rounds");
        assert_eq!(model.requests.lock().len(), 2);
    }
}
