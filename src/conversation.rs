use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::LLMConfig;
use crate::dispatcher::IntentDispatcher;
use crate::error::AssistantError;
use crate::event_bus::{Event, EventBus};
use crate::intent::{self, Interpretation};
use crate::llm_manager::{ChatMessage, LLMManager};
use crate::ui::Console;

const GREETING_PROMPT: &str = "How can I help you today?";

const SYSTEM_PROMPT: &str = r#"You are a todo list assistant. You manage the user's todos by calling exactly one of these functions at a time:

- createTodo(todoContent: string): adds a todo and returns its numeric id
- deleteTodoById(id: number): deletes the todo with that id
- getAllTodos(): returns every todo
- searchTodo(query: string): returns the todos whose text contains the query

To call a function, reply with nothing but one JSON object:
{"function": "<function name>", "input": "<argument>"}
Use "" as the input for getAllTodos. Todo ids are numbers.

After a call you will receive a message of the form
{"type": "observation", "observation": "<result>"}
Answer it with nothing but
{"type": "output", "output": "<your answer to the user>"}
Acknowledge created todos with their id, confirm deletions, present lists as a numbered list and say so when there are no todos.

If the user is just chatting, or the request is unclear, reply in plain language without calling a function."#;

/// What the console should show after a step of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Assistant(String),
    Raw(String),
    Observation(String),
    Notice(String),
}

/// Drives the read, interpret, dispatch, answer cycle for one user.
pub struct ConversationLoop<'a> {
    llm: &'a LLMManager,
    dispatcher: IntentDispatcher<'a>,
    event_bus: Option<Arc<EventBus>>,
    transcript: Vec<ChatMessage>,
    max_actions: usize,
    feed_observations: bool,
    show_raw_replies: bool,
}

impl<'a> ConversationLoop<'a> {
    pub fn new(llm: &'a LLMManager, dispatcher: IntentDispatcher<'a>, settings: &LLMConfig) -> Self {
        Self {
            llm,
            dispatcher,
            event_bus: None,
            transcript: vec![ChatMessage::system(SYSTEM_PROMPT)],
            max_actions: settings.max_actions_per_turn.max(1),
            feed_observations: settings.feed_observations,
            show_raw_replies: false,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_raw_replies(mut self, show: bool) -> Self {
        self.show_raw_replies = show;
        self
    }

    #[cfg(test)]
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Read lines from `input` until EOF or `exit`/`quit`.
    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, input: R, console: &Console) -> Result<()> {
        for output in self.greet().await {
            console.show(&output);
        }

        let mut lines = input.lines();
        loop {
            console.prompt()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                info!("User ended the session");
                break;
            }
            for output in self.handle_turn(line).await {
                console.show(&output);
            }
        }
        Ok(())
    }

    /// Ask the model for an opening line.
    pub async fn greet(&mut self) -> Vec<Output> {
        self.transcript.push(ChatMessage::user(GREETING_PROMPT));
        match self.llm.send(&self.transcript).await {
            Ok(reply) => {
                self.transcript.push(ChatMessage::assistant(reply.clone()));
                let text = match intent::interpret(&reply) {
                    Interpretation::Unparsable { text } => text,
                    _ => reply,
                };
                vec![Output::Assistant(text)]
            }
            Err(err) => vec![Output::Notice(describe(&err))],
        }
    }

    /// Handle one user message. Failures become notices rather than errors.
    pub async fn handle_turn(&mut self, user_text: &str) -> Vec<Output> {
        let mut outputs = Vec::new();
        if let Err(err) = self.run_turn(user_text, &mut outputs).await {
            warn!("Turn failed: {}", err);
            outputs.push(Output::Notice(describe(&err)));
        }
        outputs
    }

    async fn run_turn(
        &mut self,
        user_text: &str,
        outputs: &mut Vec<Output>,
    ) -> Result<(), AssistantError> {
        self.transcript.push(ChatMessage::user(user_text));

        let mut actions = 0;
        loop {
            let reply = self.llm.send(&self.transcript).await?;
            self.transcript.push(ChatMessage::assistant(reply.clone()));
            if self.show_raw_replies {
                outputs.push(Output::Raw(reply.clone()));
            }

            let (instruction, source) = match intent::interpret(&reply) {
                Interpretation::Actionable {
                    instruction,
                    source,
                } => (instruction, source),
                Interpretation::Unparsable { text } => {
                    info!("Reply has no actionable intent");
                    self.emit(Event::IntentUnrecognized {
                        reply: reply.clone(),
                    })
                    .await;
                    outputs.push(Output::Assistant(text));
                    return Ok(());
                }
                Interpretation::InvalidArgument { function, detail } => {
                    self.emit(Event::InvalidArgument {
                        function: function.to_string(),
                        detail: detail.clone(),
                    })
                    .await;
                    return Err(AssistantError::InvalidArgument {
                        function: function.to_string(),
                        detail,
                    });
                }
            };

            if actions == self.max_actions {
                warn!("Ignoring {} after {} actions", instruction.function_name(), actions);
                outputs.push(Output::Notice(format!(
                    "Stopped after {} operations for one message. Please ask again if more is needed.",
                    actions
                )));
                return Ok(());
            }
            actions += 1;

            self.emit(Event::IntentParsed {
                function: instruction.function_name().to_string(),
                source: source.to_string(),
            })
            .await;
            let observation = self.dispatcher.dispatch(&instruction).await?.to_string();
            outputs.push(Output::Observation(observation.clone()));

            if !self.feed_observations {
                return Ok(());
            }
            let message = serde_json::json!({ "type": "observation", "observation": observation });
            self.transcript.push(ChatMessage::user(message.to_string()));
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(event).await;
        }
    }
}

/// Plain-language message for a failed turn.
fn describe(err: &AssistantError) -> String {
    match err {
        AssistantError::Persistence(detail) => {
            format!("Sorry, I couldn't update your todo list: {}", detail)
        }
        AssistantError::InvalidArgument { function, detail } => format!(
            "I couldn't work out what to pass to {} ({}). Could you rephrase? Todo ids are numbers.",
            function, detail
        ),
        AssistantError::Upstream(_) | AssistantError::UpstreamTimeout(_) => format!(
            "The assistant is unavailable right now ({}). Please try again.",
            err
        ),
        AssistantError::Config(_) => err.to_string(),
    }
}
