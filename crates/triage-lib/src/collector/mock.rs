//! Scripted runner for tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CommandOutput, CommandRunner, Invocation};
use crate::error::CollectError;

/// Answers invocations whose rendered command contains a registered
/// fragment. Registered responses are consumed in order and the last one
/// repeats. Earlier registrations win when several fragments match.
#[derive(Default)]
pub struct MockRunner {
    responses: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
    calls: Mutex<Vec<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, fragment: &str, output: CommandOutput) -> Self {
        {
            let mut responses = self.responses.lock().unwrap();
            match responses.iter().position(|(f, _)| f.as_str() == fragment) {
                Some(idx) => responses[idx].1.push_back(output),
                None => responses.push((fragment.to_string(), VecDeque::from([output]))),
            }
        }
        self
    }

    pub fn on_json(self, fragment: &str, json: serde_json::Value) -> Self {
        self.on(fragment, CommandOutput::success(json.to_string()))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CollectError> {
        let rendered = invocation.to_string();
        self.calls.lock().unwrap().push(rendered.clone());

        let mut responses = self.responses.lock().unwrap();
        let Some((_, queue)) = responses.iter_mut().find(|(f, _)| rendered.contains(f.as_str()))
        else {
            return Ok(CommandOutput::failure(127, format!("unexpected command: {}", rendered)));
        };

        let output = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(output)
    }
}
