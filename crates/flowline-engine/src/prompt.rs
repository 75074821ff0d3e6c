use serde_json::Value;

use flowline_core::types::TaskConfig;

/// Instruction used when a task has neither a custom prompt nor a label.
pub const GENERIC_INSTRUCTION: &str = "Process the following input:";

const DEFAULT_CLOSING: &str = "Please process this input according to your instructions.";

/// Build the prompt sent to the model for one task.
///
/// A custom instruction (`node_data.prompt`) gets the input appended as-is;
/// the default instruction also gets a closing request sentence.
pub fn build_prompt(config: &TaskConfig, previous_output: Option<&Value>) -> String {
    let custom = config
        .node_data
        .prompt
        .as_deref()
        .filter(|p| !p.is_empty());

    let base = match custom {
        Some(prompt) => prompt.to_string(),
        None => match config.node_data.label.as_deref().filter(|l| !l.is_empty()) {
            Some(label) => format!("Process node: {}", label),
            None => GENERIC_INSTRUCTION.to_string(),
        },
    };

    let Some(input) = previous_output.filter(|v| has_content(v)) else {
        return base;
    };
    let rendered = render_output(input);

    if custom.is_some() {
        format!("{}\n\nInput data: {}", base, rendered)
    } else {
        format!("{}\n\nInput data: {}\n\n{}", base, rendered, DEFAULT_CLOSING)
    }
}

/// Whether a running output counts as input. Empty values do not.
pub fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Text form of a previous output.
///
/// Chat-completion payloads yield their first message content, invoker
/// envelopes yield their `data`; anything else is shown as-is.
pub fn render_output(value: &Value) -> String {
    if let Value::Object(obj) = value {
        if let Some(first) = obj
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
        {
            return first
                .get("message")
                .and_then(|m| m.get("content"))
                .map(display)
                .unwrap_or_else(|| display(value));
        }
        if let Some(data) = obj.get("data") {
            return display(data);
        }
    }
    display(value)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
