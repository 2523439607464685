//! Scripted executors for tests
//!
//! Commands are matched against rules by substring, first match wins. A rule
//! with several responses hands them out in order and then keeps repeating
//! the last one. Unmatched commands succeed with empty output. Every call is
//! recorded for later assertions.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{RemoteError, RemoteResult};
use crate::executor::{RemoteExecutor, RemoteSession};
use crate::output::CommandOutput;
use crate::runner::CommandRunner;

#[derive(Debug)]
struct Rule {
    host: Option<String>,
    pattern: String,
    responses: VecDeque<CommandOutput>,
}

#[derive(Debug, Default)]
struct Rules(Mutex<Vec<Rule>>);

impl Rules {
    fn push(&self, host: Option<String>, pattern: &str, responses: Vec<CommandOutput>) {
        self.0.lock().push(Rule {
            host,
            pattern: pattern.to_string(),
            responses: responses.into(),
        });
    }

    fn respond(&self, host: Option<&str>, command: &str) -> CommandOutput {
        let mut rules = self.0.lock();
        let rule = rules.iter_mut().find(|r| {
            let host_matches = match (&r.host, host) {
                (Some(want), Some(got)) => want == got,
                (Some(_), None) => false,
                (None, _) => true,
            };
            host_matches && command.contains(&r.pattern)
        });

        match rule {
            Some(rule) if rule.responses.len() > 1 => rule.responses.pop_front().unwrap_or_default(),
            Some(rule) => rule.responses.front().cloned().unwrap_or_default(),
            None => CommandOutput::ok(""),
        }
    }
}

/// A recorded remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub host: String,
    pub command: String,
    pub interactive: bool,
}

/// [`RemoteExecutor`] that answers from scripted rules.
#[derive(Debug, Default, Clone)]
pub struct ScriptedExecutor {
    rules: Arc<Rules>,
    calls: Arc<Mutex<Vec<RemoteCall>>>,
    inputs: Arc<Mutex<Vec<(String, String)>>>,
    unreachable: Arc<Mutex<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands on any host containing `pattern`.
    pub fn on(&self, pattern: &str, output: CommandOutput) -> &Self {
        self.rules.push(None, pattern, vec![output]);
        self
    }

    /// Answer commands on `host` containing `pattern`.
    pub fn on_host(&self, host: &str, pattern: &str, output: CommandOutput) -> &Self {
        self.rules.push(Some(host.to_string()), pattern, vec![output]);
        self
    }

    /// Answer successive matching commands on `host` with `outputs` in order.
    pub fn sequence(&self, host: &str, pattern: &str, outputs: Vec<CommandOutput>) -> &Self {
        self.rules.push(Some(host.to_string()), pattern, outputs);
        self
    }

    /// Fail every call to `host` with [`RemoteError::UnknownHost`].
    pub fn unreachable(&self, host: &str) -> &Self {
        self.unreachable.lock().push(host.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    /// Hosts that received a command containing `pattern`, in call order.
    pub fn hosts_running(&self, pattern: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.command.contains(pattern))
            .map(|c| c.host.clone())
            .collect()
    }

    /// Input written to interactive sessions, as `(host, input)`.
    pub fn session_inputs(&self) -> Vec<(String, String)> {
        self.inputs.lock().clone()
    }

    fn record(&self, host: &str, command: &str, interactive: bool) -> RemoteResult<()> {
        if self.unreachable.lock().iter().any(|h| h == host) {
            return Err(RemoteError::UnknownHost(host.to_string()));
        }
        self.calls.lock().push(RemoteCall {
            host: host.to_string(),
            command: command.to_string(),
            interactive,
        });
        Ok(())
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn execute(&self, host: &str, command: &str) -> RemoteResult<CommandOutput> {
        self.record(host, command, false)?;
        Ok(self.rules.respond(Some(host), command))
    }

    async fn spawn(&self, host: &str, command: &str) -> RemoteResult<Box<dyn RemoteSession>> {
        self.record(host, command, true)?;
        Ok(Box::new(ScriptedSession {
            host: host.to_string(),
            output: self.rules.respond(Some(host), command),
            inputs: self.inputs.clone(),
            closed: false,
        }))
    }
}

struct ScriptedSession {
    host: String,
    output: CommandOutput,
    inputs: Arc<Mutex<Vec<(String, String)>>>,
    closed: bool,
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn send(&mut self, input: &str) -> RemoteResult<()> {
        if self.closed {
            return Err(RemoteError::InputClosed(self.host.clone()));
        }
        self.inputs.lock().push((self.host.clone(), input.to_string()));
        Ok(())
    }

    async fn close_input(&mut self) -> RemoteResult<()> {
        self.closed = true;
        Ok(())
    }

    async fn wait(&mut self) -> RemoteResult<CommandOutput> {
        self.closed = true;
        Ok(self.output.clone())
    }
}

/// [`CommandRunner`] that answers from scripted rules.
///
/// Rules match against the full command line, `program arg1 arg2 ...`.
#[derive(Debug, Default, Clone)]
pub struct ScriptedRunner {
    rules: Arc<Rules>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, pattern: &str, output: CommandOutput) -> &Self {
        self.rules.push(None, pattern, vec![output]);
        self
    }

    pub fn sequence(&self, pattern: &str, outputs: Vec<CommandOutput>) -> &Self {
        self.rules.push(None, pattern, outputs);
        self
    }

    /// Recorded command lines, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.contains(pattern))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> RemoteResult<CommandOutput> {
        let line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().push(line.clone());
        Ok(self.rules.respond(None, &line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequence_then_repeat() {
        let exec = ScriptedExecutor::new();
        exec.sequence(
            "m",
            "cat",
            vec![CommandOutput::ok("a"), CommandOutput::ok("b")],
        );

        assert_eq!(exec.execute("m", "cat log").await.unwrap().stdout, "a");
        assert_eq!(exec.execute("m", "cat log").await.unwrap().stdout, "b");
        assert_eq!(exec.execute("m", "cat log").await.unwrap().stdout, "b");
        assert_eq!(exec.execute("w", "cat log").await.unwrap().stdout, "");
        assert_eq!(exec.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_session_records_input() {
        let exec = ScriptedExecutor::new();
        let mut session = exec.spawn("m", "init").await.unwrap();
        session.send("y\n").await.unwrap();
        session.close_input().await.unwrap();
        assert!(session.wait().await.unwrap().success());
        assert_eq!(exec.session_inputs(), vec![("m".to_string(), "y\n".to_string())]);
    }

    #[tokio::test]
    async fn test_runner_matches_command_line() {
        let runner = ScriptedRunner::new();
        runner.on("rollout status", CommandOutput::ok("done"));
        let out = runner
            .run("kubectl", &["rollout".into(), "status".into(), "deployment/x".into()])
            .await
            .unwrap();
        assert_eq!(out.stdout, "done");
        assert_eq!(runner.calls(), vec!["kubectl rollout status deployment/x"]);
    }
}
