use std::fmt;
use std::str::FromStr;

use log::debug;
use serde_json::Value;

/// Operations the model may ask for, in matching precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionName {
    CreateTodo,
    DeleteTodoById,
    GetAllTodos,
    SearchTodo,
}

impl FunctionName {
    pub const PRECEDENCE: [FunctionName; 4] = [
        FunctionName::CreateTodo,
        FunctionName::DeleteTodoById,
        FunctionName::GetAllTodos,
        FunctionName::SearchTodo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionName::CreateTodo => "createTodo",
            FunctionName::DeleteTodoById => "deleteTodoById",
            FunctionName::GetAllTodos => "getAllTodos",
            FunctionName::SearchTodo => "searchTodo",
        }
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PRECEDENCE
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown function '{}'", s))
    }
}

/// A decoded request to run one todo operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    CreateTodo { content: String },
    DeleteTodoById { id: i64 },
    GetAllTodos,
    SearchTodo { query: String },
}

impl Instruction {
    pub fn function_name(&self) -> FunctionName {
        match self {
            Instruction::CreateTodo { .. } => FunctionName::CreateTodo,
            Instruction::DeleteTodoById { .. } => FunctionName::DeleteTodoById,
            Instruction::GetAllTodos => FunctionName::GetAllTodos,
            Instruction::SearchTodo { .. } => FunctionName::SearchTodo,
        }
    }
}

/// Which pass of the interpreter recognised the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseSource {
    Envelope,
    Heuristic,
}

impl fmt::Display for ParseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseSource::Envelope => f.write_str("envelope"),
            ParseSource::Heuristic => f.write_str("heuristic"),
        }
    }
}

/// Outcome of interpreting one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpretation {
    Actionable {
        instruction: Instruction,
        source: ParseSource,
    },
    /// The reply names no known operation; `text` is what the user should see.
    Unparsable { text: String },
    /// An operation was named but its argument is missing or malformed.
    InvalidArgument {
        function: FunctionName,
        detail: String,
    },
}

const INPUT_KEY: &str = "input\"";
const DELETE_CALL: &str = "deleteTodoById(";

/// Translate a raw model reply into an [`Interpretation`].
///
/// The reply is first parsed as a JSON envelope `{"function": .., "input": ..}`.
/// Only when that fails are the function names scanned for as substrings, in
/// [`FunctionName::PRECEDENCE`] order, with the argument pulled out by markers.
pub fn interpret(reply: &str) -> Interpretation {
    let body = strip_code_fence(reply);

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if let (Some(Value::String(function)), Some(input)) = (map.get("function"), map.get("input"))
        {
            let interpretation = match function.trim().parse::<FunctionName>() {
                Ok(name) => from_envelope(name, input),
                Err(err) => {
                    debug!("Envelope names {}", err);
                    Interpretation::Unparsable {
                        text: reply.to_string(),
                    }
                }
            };
            return interpretation;
        }
        if let Some(Value::String(output)) = map.get("output") {
            return Interpretation::Unparsable {
                text: output.trim().to_string(),
            };
        }
    }

    debug!("Reply is not a function envelope, scanning for function names");
    scan(reply)
}

fn from_envelope(name: FunctionName, input: &Value) -> Interpretation {
    let text = match input {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    let result = match name {
        FunctionName::GetAllTodos => Ok(Instruction::GetAllTodos),
        FunctionName::CreateTodo => {
            require_text(name, text).map(|content| Instruction::CreateTodo { content })
        }
        FunctionName::SearchTodo => {
            require_text(name, text).map(|query| Instruction::SearchTodo { query })
        }
        FunctionName::DeleteTodoById => match input {
            Value::Number(n) => n
                .as_i64()
                .map(|id| Instruction::DeleteTodoById { id })
                .ok_or_else(|| format!("'{}' is not a whole number", n)),
            _ => parse_id(text.as_deref().unwrap_or_default())
                .map(|id| Instruction::DeleteTodoById { id }),
        },
    };

    finish(name, result, ParseSource::Envelope)
}

fn scan(reply: &str) -> Interpretation {
    let Some(name) = FunctionName::PRECEDENCE
        .into_iter()
        .find(|name| reply.contains(name.as_str()))
    else {
        return Interpretation::Unparsable {
            text: reply.to_string(),
        };
    };

    let result = match name {
        FunctionName::GetAllTodos => Ok(Instruction::GetAllTodos),
        FunctionName::CreateTodo => require_text(name, input_value(reply))
            .map(|content| Instruction::CreateTodo { content }),
        FunctionName::SearchTodo => {
            require_text(name, input_value(reply)).map(|query| Instruction::SearchTodo { query })
        }
        FunctionName::DeleteTodoById => {
            delete_argument(reply).map(|id| Instruction::DeleteTodoById { id })
        }
    };

    finish(name, result, ParseSource::Heuristic)
}

fn finish(
    name: FunctionName,
    result: Result<Instruction, String>,
    source: ParseSource,
) -> Interpretation {
    match result {
        Ok(instruction) => {
            debug!("Parsed {:?} from {}", instruction, source);
            Interpretation::Actionable {
                instruction,
                source,
            }
        }
        Err(detail) => Interpretation::InvalidArgument {
            function: name,
            detail,
        },
    }
}

fn require_text(name: FunctionName, text: Option<String>) -> Result<String, String> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(format!("{} needs a non-empty text input", name)),
    }
}

fn parse_id(raw: &str) -> Result<i64, String> {
    let raw = raw.trim().trim_matches('"').trim();
    raw.parse::<i64>()
        .map_err(|_| format!("'{}' is not a todo id", raw))
}

/// The call form wins when it holds a valid id; otherwise the `input` value is tried.
fn delete_argument(reply: &str) -> Result<i64, String> {
    match call_argument(reply).map(|raw| parse_id(&raw)) {
        Some(Ok(id)) => Ok(id),
        call => match input_value(reply) {
            Some(raw) => parse_id(&raw),
            None => call.unwrap_or_else(|| Err("no todo id found".to_string())),
        },
    }
}

/// Value of the first `"input": ..` pair. A quoted value is read up to the next
/// unescaped quote, an unquoted one only as far as it looks like a number.
fn input_value(reply: &str) -> Option<String> {
    let start = reply.find(INPUT_KEY)? + INPUT_KEY.len();
    let rest = reply[start..].trim_start().strip_prefix(':')?.trim_start();
    let Some(rest) = rest.strip_prefix('"') else {
        let number: String = rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '-')
            .collect();
        return (!number.is_empty()).then_some(number);
    };

    let mut value = String::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(value),
            '\\' => {
                if let Some(next) = chars.next() {
                    value.push(next);
                }
            }
            _ => value.push(c),
        }
    }
    None
}

/// Argument of a `deleteTodoById(<id>)` call form.
fn call_argument(reply: &str) -> Option<String> {
    let start = reply.find(DELETE_CALL)? + DELETE_CALL.len();
    let len = reply[start..].find(')')?;
    Some(reply[start..start + len].to_string())
}

/// Drop a surrounding markdown code fence, with or without a `json` tag.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = inner.strip_suffix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actionable(reply: &str) -> (Instruction, ParseSource) {
        match interpret(reply) {
            Interpretation::Actionable {
                instruction,
                source,
            } => (instruction, source),
            other => panic!("expected an instruction, got {:?}", other),
        }
    }

    #[test]
    fn test_create_envelope() {
        let (instruction, source) = actionable(r#"{"function":"createTodo","input":"Buy milk"}"#);
        assert_eq!(
            instruction,
            Instruction::CreateTodo {
                content: "Buy milk".to_string()
            }
        );
        assert_eq!(source, ParseSource::Envelope);
    }

    #[test]
    fn test_envelope_with_padded_function_name() {
        let reply = r#"{"type" : "action" , "function" :" deleteTodoById" , "input" : "3" }"#;
        let (instruction, source) = actionable(reply);
        assert_eq!(instruction, Instruction::DeleteTodoById { id: 3 });
        assert_eq!(source, ParseSource::Envelope);
    }

    #[test]
    fn test_delete_envelope_accepts_string_or_number() {
        let (a, _) = actionable(r#"{"function":"deleteTodoById","input":"3"}"#);
        let (b, _) = actionable(r#"{"function":"deleteTodoById","input":3}"#);
        assert_eq!(a, Instruction::DeleteTodoById { id: 3 });
        assert_eq!(a, b);
    }

    #[test]
    fn test_delete_call_form() {
        let (instruction, source) = actionable("Sure, calling deleteTodoById(3) now.");
        assert_eq!(instruction, Instruction::DeleteTodoById { id: 3 });
        assert_eq!(source, ParseSource::Heuristic);
    }

    #[test]
    fn test_fenced_envelope() {
        let reply = "```json\n{\"function\": \"searchTodo\", \"input\": \"milk\"}\n```";
        let (instruction, source) = actionable(reply);
        assert_eq!(
            instruction,
            Instruction::SearchTodo {
                query: "milk".to_string()
            }
        );
        assert_eq!(source, ParseSource::Envelope);
    }

    #[test]
    fn test_get_all_ignores_input() {
        let (instruction, _) = actionable(r#"{"function":"getAllTodos","input":""}"#);
        assert_eq!(instruction, Instruction::GetAllTodos);

        let (instruction, source) = actionable("I will call getAllTodos to list them.");
        assert_eq!(instruction, Instruction::GetAllTodos);
        assert_eq!(source, ParseSource::Heuristic);
    }

    #[test]
    fn test_heuristic_reads_input_marker() {
        let reply = r#"Plan: use createTodo. {"function": "createTodo", "input": "Call \"mom\"", } trailing"#;
        let (instruction, source) = actionable(reply);
        assert_eq!(
            instruction,
            Instruction::CreateTodo {
                content: "Call \"mom\"".to_string()
            }
        );
        assert_eq!(source, ParseSource::Heuristic);
    }

    #[test]
    fn test_heuristic_delete_reads_bare_number_input() {
        let (instruction, source) = actionable(r#"Sure! {"function": "deleteTodoById", "input": 3}"#);
        assert_eq!(instruction, Instruction::DeleteTodoById { id: 3 });
        assert_eq!(source, ParseSource::Heuristic);
    }

    #[test]
    fn test_heuristic_delete_falls_back_to_input_when_call_is_not_an_id() {
        let reply = r#"I'll use deleteTodoById(id) here: {"function": "deleteTodoById", "input": "3"} done"#;
        let (instruction, source) = actionable(reply);
        assert_eq!(instruction, Instruction::DeleteTodoById { id: 3 });
        assert_eq!(source, ParseSource::Heuristic);
    }

    #[test]
    fn test_input_text_is_kept_verbatim() {
        let expected = Instruction::CreateTodo {
            content: "  Buy milk ".to_string(),
        };
        let (envelope, _) = actionable(r#"{"function":"createTodo","input":"  Buy milk "}"#);
        let (heuristic, _) = actionable(r#"ok: {"function":"createTodo","input":"  Buy milk "}"#);
        assert_eq!(envelope, expected);
        assert_eq!(heuristic, expected);
    }

    #[test]
    fn test_precedence_prefers_create() {
        let reply = r#"searchTodo first? no: createTodo with input": "read book""#;
        let (instruction, _) = actionable(reply);
        assert_eq!(
            instruction,
            Instruction::CreateTodo {
                content: "read book".to_string()
            }
        );
    }

    #[test]
    fn test_conversational_reply_is_unparsable() {
        let reply = "I'm not sure what you mean";
        assert_eq!(
            interpret(reply),
            Interpretation::Unparsable {
                text: reply.to_string()
            }
        );
    }

    #[test]
    fn test_output_envelope_surfaces_text() {
        let reply = r#"{"type": "output", "output": " Your todo has been added."}"#;
        assert_eq!(
            interpret(reply),
            Interpretation::Unparsable {
                text: "Your todo has been added.".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_envelope_function_is_unparsable() {
        let reply = r#"{"function":"updateTodoById","input":"1"}"#;
        assert!(matches!(interpret(reply), Interpretation::Unparsable { .. }));
    }

    #[test]
    fn test_non_numeric_id_is_invalid() {
        let reply = r#"{"function":"deleteTodoById","input":"the milk one"}"#;
        assert!(matches!(
            interpret(reply),
            Interpretation::InvalidArgument {
                function: FunctionName::DeleteTodoById,
                ..
            }
        ));
        assert!(matches!(
            interpret("deleteTodoById(abc)"),
            Interpretation::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_missing_text_input_is_invalid() {
        assert!(matches!(
            interpret("I'll use createTodo for that."),
            Interpretation::InvalidArgument {
                function: FunctionName::CreateTodo,
                ..
            }
        ));
        assert!(matches!(
            interpret(r#"{"function":"searchTodo","input":"  "}"#),
            Interpretation::InvalidArgument {
                function: FunctionName::SearchTodo,
                ..
            }
        ));
    }

    #[test]
    fn test_function_name_round_trip() {
        for name in FunctionName::PRECEDENCE {
            assert_eq!(name.as_str().parse::<FunctionName>(), Ok(name));
        }
        assert!("createtodo".parse::<FunctionName>().is_err());
    }
}
