#[cfg(test)]
mod tests {
    use super::super::*;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    fn sh(command_line: &str) -> ProcessCommandBuilder {
        ProcessCommandBuilder::new(command_line).kill_grace(Duration::from_millis(300))
    }

    #[tokio::test]
    async fn test_production_runner_lines_in_order() {
        let runner = TokioProcessRunner;
        let result = runner
            .run(sh("printf 'one\\ntwo\\nthree\\n'").build())
            .await;

        assert!(result.success());
        assert_eq!(result.exit_code(), 0);
        assert_eq!(result.lines, vec!["one", "two", "three"]);
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_production_runner_failure_code() {
        let runner = TokioProcessRunner;
        let result = runner.run(sh("echo nope; exit 3").build()).await;

        assert!(!result.success());
        assert_eq!(result.exit_code(), 3);
        assert_eq!(result.lines, vec!["nope"]);
    }

    #[tokio::test]
    async fn test_stderr_kept_apart_unless_combined() {
        let runner = TokioProcessRunner;

        let separate = runner.run(sh("echo out; echo err >&2").build()).await;
        assert_eq!(separate.lines, vec!["out"]);
        assert_eq!(separate.stderr, vec!["err"]);

        let combined = runner
            .run(sh("echo out; echo err >&2").combine_stderr(true).build())
            .await;
        assert!(combined.lines.contains(&"out".to_string()));
        assert!(combined.lines.contains(&"err".to_string()));
        assert!(combined.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_reports_sentinel_and_reason() {
        let runner = TokioProcessRunner;
        let result = runner
            .run(sh("echo hi").shell("/nonexistent/shell-12345").build())
            .await;

        assert_eq!(result.status, ExitStatus::SpawnFailed);
        assert_eq!(result.exit_code(), SPAWN_FAILED_EXIT_CODE);
        assert_eq!(result.lines.len(), 1);
        assert!(result.lines[0].contains("/nonexistent/shell-12345"));
        assert!(matches!(
            result.into_checked(),
            Err(ProcessError::SpawnFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_command_line_is_a_spawn_failure() {
        let runner = TokioProcessRunner;
        let result = runner.run(sh("   ").build()).await;

        assert_eq!(result.exit_code(), SPAWN_FAILED_EXIT_CODE);
        assert!(result.text().contains("empty command line"));
    }

    #[tokio::test]
    async fn test_cancel_terminates_long_running_command() {
        let runner = TokioProcessRunner;
        let token = CancellationToken::new();
        let running = runner.spawn(sh("echo started; sleep 30").cancel_on(token.clone()).build());
        let (mut output, exit) = running.into_parts();

        assert_eq!(output.next_line().await.as_deref(), Some("started"));

        let start = Instant::now();
        token.cancel();
        let report = exit.wait().await;

        assert_eq!(report.status, ExitStatus::Cancelled);
        assert_eq!(report.code(), CANCELLED_EXIT_CODE);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(output.next_line().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_escalates_when_sigterm_ignored() {
        let runner = TokioProcessRunner;
        let token = CancellationToken::new();
        let running = runner.spawn(
            sh("trap '' TERM; echo ready; while true; do sleep 1; done")
                .cancel_on(token.clone())
                .build(),
        );
        let (mut output, exit) = running.into_parts();
        assert_eq!(output.next_line().await.as_deref(), Some("ready"));

        let start = Instant::now();
        token.cancel();
        assert_eq!(exit.code().await, CANCELLED_EXIT_CODE);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_reaches_background_children_after_shell_exit() {
        let runner = TokioProcessRunner;
        let token = CancellationToken::new();
        let running = runner.spawn(sh("sleep 30 & echo started").cancel_on(token.clone()).build());
        let (mut output, exit) = running.into_parts();
        assert_eq!(output.next_line().await.as_deref(), Some("started"));

        // The shell is gone by now; only the backgrounded sleep holds the pipes
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(exit.try_exit().is_none());

        let start = Instant::now();
        token.cancel();
        let report = tokio::time::timeout(Duration::from_secs(5), exit.wait())
            .await
            .unwrap();

        assert_eq!(report.code(), CANCELLED_EXIT_CODE);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(output.next_line().await.is_none());
    }

    #[tokio::test]
    async fn test_timeout_reports_sentinel() {
        let runner = TokioProcessRunner;
        let result = runner
            .run(sh("sleep 30").timeout(Duration::from_millis(100)).build())
            .await;

        assert_eq!(result.status, ExitStatus::Timeout);
        assert_eq!(result.exit_code(), TIMEOUT_EXIT_CODE);
        assert!(matches!(
            result.into_checked(),
            Err(ProcessError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_env_and_working_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = TokioProcessRunner;
        let result = runner
            .run(
                sh("echo \"$DOCKHAND_TEST_VALUE\"; pwd")
                    .env("DOCKHAND_TEST_VALUE", "hello")
                    .current_dir(dir.path())
                    .build(),
            )
            .await;

        assert_eq!(result.lines[0], "hello");
        let reported = std::fs::canonicalize(&result.lines[1]).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_stdin_is_delivered() {
        let runner = TokioProcessRunner;
        let result = runner
            .run(sh("cat").stdin("secret\n".to_string()).build())
            .await;

        assert_eq!(result.lines, vec!["secret"]);
    }

    #[tokio::test]
    async fn test_lines_arrive_before_exit() {
        let runner = TokioProcessRunner;
        let token = CancellationToken::new();
        let running = runner.spawn(sh("echo early; sleep 30").cancel_on(token.clone()).build());
        let (mut output, exit) = running.into_parts();

        let line = tokio::time::timeout(Duration::from_secs(5), output.next_line())
            .await
            .unwrap();
        assert_eq!(line.as_deref(), Some("early"));
        assert!(exit.try_exit().is_none());

        token.cancel();
        exit.wait().await;
    }

    #[tokio::test]
    async fn test_wait_is_repeatable_and_shared() {
        let runner = TokioProcessRunner;
        let running = runner.spawn(sh("exit 4").build());
        let (mut output, exit) = running.into_parts();
        output.fill().await;

        let other = exit.clone();
        assert_eq!(exit.code().await, 4);
        assert_eq!(exit.code().await, 4);
        assert_eq!(other.code().await, 4);
    }

    #[tokio::test]
    async fn test_waiting_before_reading_does_not_block() {
        let runner = TokioProcessRunner;
        let running = runner.spawn(sh("i=0; while [ $i -lt 2000 ]; do echo line-$i; i=$((i+1)); done").build());
        let (mut output, exit) = running.into_parts();

        let report = tokio::time::timeout(Duration::from_secs(10), exit.wait())
            .await
            .unwrap();
        assert!(report.status.success());
        assert_eq!(output.fill().await.len(), 2000);
    }

    #[tokio::test]
    async fn test_mock_runner_basic() {
        let mut mock = MockProcessRunner::new();

        mock.expect_command("docker version")
            .returns_stdout("24.0.7\n")
            .returns_success()
            .finish();

        let result = mock.run(ProcessCommandBuilder::new("docker version").build()).await;

        assert!(result.success());
        assert_eq!(result.lines, vec!["24.0.7"]);
        assert!(mock.verify_called("docker version", 1));
    }

    #[tokio::test]
    async fn test_mock_runner_times_exceeded() {
        let mut mock = MockProcessRunner::new();

        mock.expect_command("docker ps")
            .returns_success()
            .times(1)
            .finish();

        assert!(mock.run(ProcessCommandBuilder::new("docker ps").build()).await.success());

        let second = mock.run(ProcessCommandBuilder::new("docker ps").build()).await;
        assert_eq!(second.exit_code(), SPAWN_FAILED_EXIT_CODE);
        assert!(second.text().contains("expected 1"));
    }

    #[tokio::test]
    async fn test_mock_runner_without_expectation() {
        let mock = MockProcessRunner::new();
        let result = mock.run(ProcessCommandBuilder::new("docker info").build()).await;

        assert_eq!(result.exit_code(), SPAWN_FAILED_EXIT_CODE);
        assert!(result.text().contains("No expectation found"));
    }

    #[tokio::test]
    async fn test_mock_runner_stderr_routing() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("docker logs")
            .returns_stdout("out")
            .returns_stderr("err")
            .finish();

        let split = mock.run(ProcessCommandBuilder::new("docker logs a").build()).await;
        assert_eq!(split.lines, vec!["out"]);
        assert_eq!(split.stderr, vec!["err"]);

        let merged = mock
            .run(
                ProcessCommandBuilder::new("docker logs a")
                    .combine_stderr(true)
                    .build(),
            )
            .await;
        assert_eq!(merged.lines, vec!["out", "err"]);
    }

    #[tokio::test]
    async fn test_mock_runner_streams_until_cancelled() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("docker events")
            .returns_lines(&["a", "b"])
            .streams_until_cancelled()
            .finish();

        let token = CancellationToken::new();
        let running = mock.spawn(
            ProcessCommandBuilder::new("docker events")
                .cancel_on(token.clone())
                .build(),
        );
        let (mut output, exit) = running.into_parts();

        assert_eq!(output.next_line().await.as_deref(), Some("a"));
        assert_eq!(output.next_line().await.as_deref(), Some("b"));
        assert!(exit.try_exit().is_none());

        token.cancel();
        assert_eq!(exit.code().await, CANCELLED_EXIT_CODE);
        assert!(output.next_line().await.is_none());
    }

    #[tokio::test]
    async fn test_subprocess_manager_mock() {
        let (manager, mut mock) = SubprocessManager::mock();
        mock.expect_command("docker").returns_stdout("ok").finish();

        let result = manager
            .runner()
            .run(ProcessCommandBuilder::new("docker info").build())
            .await;
        assert_eq!(result.text(), "ok");
    }
}
