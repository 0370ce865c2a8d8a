use std::fmt;
use std::sync::Arc;

use log::{info, warn};

use crate::error::{AssistantError, Result};
use crate::event_bus::{Event, EventBus};
use crate::intent::Instruction;
use crate::todo_store::{TodoItem, TodoStore};

/// Result of running one instruction against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Created { id: i64 },
    Deleted { id: i64 },
    Todos(Vec<TodoItem>),
    SearchResults { query: String, todos: Vec<TodoItem> },
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Created { id } => write!(f, "{}", id),
            Observation::Deleted { id } => write!(f, "Todo with id {} deleted", id),
            Observation::Todos(todos) | Observation::SearchResults { todos, .. } => {
                let json = serde_json::to_string(todos).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

/// Routes decoded instructions to the todo store.
pub struct IntentDispatcher<'a> {
    store: &'a dyn TodoStore,
    event_bus: Option<Arc<EventBus>>,
}

impl<'a> IntentDispatcher<'a> {
    pub fn new(store: &'a dyn TodoStore) -> Self {
        Self {
            store,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Run `instruction` and describe what happened.
    pub async fn dispatch(&self, instruction: &Instruction) -> Result<Observation> {
        let result = self.run(instruction);

        let event = match &result {
            Ok(Observation::Created { id }) => Event::TodoCreated { id: *id },
            Ok(Observation::Deleted { id }) => Event::TodoDeleted { id: *id },
            Ok(Observation::Todos(todos)) => Event::TodosListed { count: todos.len() },
            Ok(Observation::SearchResults { query, todos }) => Event::TodosSearched {
                query: query.clone(),
                count: todos.len(),
            },
            Err(AssistantError::InvalidArgument { function, detail }) => Event::InvalidArgument {
                function: function.clone(),
                detail: detail.clone(),
            },
            Err(err) => {
                warn!("{} failed: {}", instruction.function_name(), err);
                Event::StoreError {
                    error: err.to_string(),
                }
            }
        };
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(event).await;
        }

        result
    }

    fn run(&self, instruction: &Instruction) -> Result<Observation> {
        match instruction {
            Instruction::CreateTodo { content } => {
                let id = self.store.create_todo(content)?;
                info!("Created todo {}", id);
                Ok(Observation::Created { id })
            }
            Instruction::DeleteTodoById { id } => {
                self.store.delete_todo_by_id(*id)?;
                info!("Deleted todo {}", id);
                Ok(Observation::Deleted { id: *id })
            }
            Instruction::GetAllTodos => Ok(Observation::Todos(self.store.get_all_todos()?)),
            Instruction::SearchTodo { query } => {
                if query.trim().is_empty() {
                    return Err(AssistantError::InvalidArgument {
                        function: instruction.function_name().to_string(),
                        detail: "search query is empty".to_string(),
                    });
                }
                Ok(Observation::SearchResults {
                    query: query.clone(),
                    todos: self.store.search_todo(query)?,
                })
            }
        }
    }
}
