//! Running actions of matched rules

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::DispatchError;
use crate::rules::RuleSet;
use crate::webhook::{DispatchContext, RequestFacts};

pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Interpreter used to run actions as `<program> -c <action>`,
/// or `<program> -l -c <action>` when running as a login shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    program: PathBuf,
    login: bool,
}

impl Shell {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            login: false,
        }
    }

    /// Login shells source the user's profile before running the action.
    pub fn with_login(mut self, login: bool) -> Self {
        self.login = login;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn is_login(&self) -> bool {
        self.login
    }

    fn command(&self, action: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        if self.login {
            cmd.arg("-l");
        }
        cmd.arg("-c").arg(action);
        cmd
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

/// Runs one action and waits for it to exit.
///
/// Request headers are exported as `YAGWR_*` variables on top of the server's
/// own environment and the request body is written to stdin. The working
/// directory is inherited. There is no timeout: a hung action blocks the caller.
pub async fn dispatch(
    shell: &Shell,
    action: &str,
    context: &DispatchContext,
) -> Result<ExitStatus, DispatchError> {
    debug!(
        "Running (shell = {:?}, login = {}): {}",
        shell.program, shell.login, action
    );
    let mut child = shell
        .command(action)
        .envs(context.environment())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| DispatchError::Spawn {
            action: action.to_string(),
            source,
        })?;

    // stdin is fed while output is collected, so neither side can fill a pipe and stall
    let stdin = child.stdin.take();
    let body = &context.body;
    let feed = async move {
        let Some(mut stdin) = stdin else {
            return;
        };
        match stdin.write_all(body).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!("Action closed stdin before reading the whole payload");
            }
            Err(e) => warn!("Failed to write payload to action stdin: {}", e),
        }
    };

    let ((), output) = tokio::join!(feed, child.wait_with_output());
    let output = output.map_err(DispatchError::Wait)?;

    debug!("Return code: {:?}", output.status.code());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        debug!("STDOUT:\n{}", stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        debug!("STDERR:\n{}", stderr);
    }
    if !output.status.success() {
        debug!(
            "Command failed, payload was\n{}\n----",
            String::from_utf8_lossy(&context.body).trim()
        );
    }

    Ok(output.status)
}

/// Outcome counts of one request's dispatch pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub matched: usize,
    /// Actions that could not be spawned or waited on. Non-zero exits are not counted.
    pub failed: usize,
}

/// Runs the action of every matching rule, one after another in declared order.
///
/// Exit statuses are logged and otherwise ignored; a failing or unlaunchable
/// action never stops the remaining ones.
pub async fn dispatch_matching(
    rules: &RuleSet,
    shell: &Shell,
    facts: &RequestFacts,
    context: &DispatchContext,
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();

    for (number, rule) in rules.matching(facts) {
        summary.matched += 1;
        info!("Rule {} matched ({}), running action", number, rule.condition);

        match dispatch(shell, &rule.action, context).await {
            Ok(status) if status.success() => {
                info!("Action of rule {} completed successfully.", number);
            }
            Ok(status) => {
                warn!("Action of rule {} exited with {}", number, status);
            }
            Err(e) => {
                summary.failed += 1;
                error!("Unable to execute action of rule {}: {}", number, e);
            }
        }
    }

    if summary.matched == 0 {
        debug!("No rule matched");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::Property;
    use axum::body::Bytes;

    fn context(body: impl Into<Vec<u8>>) -> DispatchContext {
        DispatchContext {
            headers: vec![
                ("x-gitlab-token".to_string(), "abc".to_string()),
                ("x-gitlab-event".to_string(), "Push Hook".to_string()),
            ],
            body: Bytes::from(body.into()),
        }
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn test_headers_and_body_reach_the_action() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join("env.txt");
        let body_file = dir.path().join("body.txt");
        let action = format!(
            "printf '%s|%s' \"$YAGWR_X_GITLAB_TOKEN\" \"$YAGWR_X_GITLAB_EVENT\" > '{}'; cat > '{}'",
            env_file.display(),
            body_file.display()
        );

        let status = dispatch(&Shell::default(), &action, &context(b"{\"object_kind\":\"push\"}"))
            .await
            .unwrap();

        assert!(status.success());
        assert_eq!(read(&env_file), "abc|Push Hook");
        assert_eq!(read(&body_file), "{\"object_kind\":\"push\"}");
    }

    #[tokio::test]
    async fn test_process_environment_and_cwd_are_inherited() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let action = format!("printf '%s\\n%s' \"$PATH\" \"$(pwd -P)\" > '{}'", out.display());

        dispatch(&Shell::default(), &action, &context(b"")).await.unwrap();

        let content = read(&out);
        let (path, cwd) = content.split_once('\n').unwrap();
        assert!(!path.is_empty());
        let expected = std::env::current_dir().unwrap().canonicalize().unwrap();
        assert_eq!(Path::new(cwd), expected);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_returned_not_raised() {
        let status = dispatch(&Shell::default(), "exit 3", &context(b"")).await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_action_ignoring_large_stdin() {
        let body = vec![b'x'; 4 * 1024 * 1024];
        let status = dispatch(&Shell::default(), "echo done", &context(body))
            .await
            .unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_action_writing_before_reading() {
        let body = vec![b'y'; 1024 * 1024];
        let status = dispatch(
            &Shell::default(),
            "head -c 1048576 /dev/zero; wc -c > /dev/null",
            &context(body),
        )
        .await
        .unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_shell_arguments() {
        let args = |shell: &Shell| -> Vec<String> {
            shell
                .command("echo hi")
                .as_std()
                .get_args()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect()
        };

        assert_eq!(args(&Shell::default()), ["-c", "echo hi"]);
        let login = Shell::default().with_login(true);
        assert_eq!(args(&login), ["-l", "-c", "echo hi"]);
        assert_eq!(login.command("true").as_std().get_program(), DEFAULT_SHELL);
    }

    #[tokio::test]
    async fn test_login_shell_runs_the_action() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let action = format!("cat > '{}'", out.display());
        let shell = Shell::default().with_login(true);

        let status = dispatch(&shell, &action, &context(b"payload")).await.unwrap();

        assert!(status.success());
        assert_eq!(read(&out), "payload");
    }

    #[tokio::test]
    async fn test_missing_shell_is_a_spawn_error() {
        let shell = Shell::new("/nonexistent/bin/sh");
        let err = dispatch(&shell, "true", &context(b"")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Spawn { action, .. } if action == "true"));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_later_actions() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.txt");
        let yaml = format!(
            r#"
- condition: gitlab_token = abc
  action: echo one >> '{log}'; exit 1
- condition: gitlab_event = "Merge Request Hook"
  action: echo skipped >> '{log}'
- condition: gitlab_token ~= ^a
  action: kill -9 $$
- condition:
    all: []
  action: echo two >> '{log}'
"#,
            log = log.display()
        );
        let rules = RuleSet::from_yaml(&yaml).unwrap();
        let facts = RequestFacts::default()
            .with(Property::GitlabToken, "abc")
            .with(Property::GitlabEvent, "Push Hook");

        let summary = dispatch_matching(&rules, &Shell::default(), &facts, &context(b"")).await;

        assert_eq!(summary.matched, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(read(&log), "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_launch_failures_are_counted_and_isolated() {
        let rules = RuleSet::from_yaml("- condition: path = /\n  action: 'true'\n- condition: path = /\n  action: 'true'\n")
            .unwrap();
        let facts = RequestFacts::default().with(Property::Path, "/");

        let summary = dispatch_matching(
            &rules,
            &Shell::new("/nonexistent/bin/sh"),
            &facts,
            &context(b""),
        )
        .await;

        assert_eq!(
            summary,
            DispatchSummary {
                matched: 2,
                failed: 2
            }
        );
    }

    #[tokio::test]
    async fn test_no_match_runs_nothing() {
        let rules = RuleSet::from_yaml("- condition: path = /deploy\n  action: exit 1\n").unwrap();
        let summary = dispatch_matching(
            &rules,
            &Shell::default(),
            &RequestFacts::default(),
            &context(b""),
        )
        .await;
        assert_eq!(summary, DispatchSummary::default());
    }
}
