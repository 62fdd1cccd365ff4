//! Run command

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use camino::Utf8Path;
use retrying_core::config::{RetryConfig, WaitRandomConfig};
use retrying_core::retry::TracingObserver;
use tokio::process::Command;

use crate::cli::RunArgs;
use crate::output;

pub async fn run(args: RunArgs, config: Option<&Utf8Path>, quiet: bool) -> Result<()> {
    let policies = super::load_policies(config)?;

    let mut policy = match (&policies, args.policy.as_deref()) {
        (Some((path, policies)), name) => {
            tracing::debug!(path = %path, policy = name.unwrap_or("default"), "using policy file");
            match name {
                Some(name) => {
                    if !policies.defines(name) {
                        tracing::warn!(
                            policy = name,
                            path = %path,
                            "policy not defined, falling back to default"
                        );
                    }
                    policies.policy(name).clone()
                }
                None => policies.default.clone(),
            }
        }
        (None, Some(name)) => {
            return Err(anyhow!(
                "Policy '{}' requested but no policy file was found",
                name
            ))
        }
        (None, None) => RetryConfig::default(),
    };
    apply_overrides(&mut policy, &args);

    let display = args.command.join(" ");
    let argv = Arc::new(args.command);
    let start = Instant::now();

    policy
        .to_builder()
        .observer(TracingObserver::new(display.clone()))
        .function(move || {
            let argv = Arc::clone(&argv);
            async move { run_once(&argv).await }
        })
        .run()
        .await
        .map_err(|e| anyhow::Error::new(e).context(format!("`{}` did not succeed", display)))?;

    if !quiet {
        output::success(&format!(
            "`{}` succeeded after {:.1}s",
            display,
            start.elapsed().as_secs_f64()
        ));
    }
    Ok(())
}

/// Layer command-line flags over the file policy
fn apply_overrides(policy: &mut RetryConfig, args: &RunArgs) {
    if let Some(n) = args.attempts {
        policy.max_attempts = n;
    }
    if let Some(ms) = args.max_delay_ms {
        policy.max_delay_ms = Some(ms);
    }
    if let Some(ms) = args.wait_fixed_ms {
        policy.wait_fixed_ms = Some(ms);
    }
    if let Some([min, max]) = args.wait_random_ms.as_deref() {
        policy.wait_random_ms = Some(WaitRandomConfig {
            min: *min,
            max: *max,
        });
    }
    if let Some(size) = args.stack_size {
        policy.stack_size = size;
    }
    if args.all_threads {
        policy.all_threads = true;
    }
}

/// One attempt: spawn the command and wait for it
///
/// The child is killed if the attempt is abandoned at the deadline.
async fn run_once(argv: &[String]) -> Result<()> {
    let (program, rest) = argv
        .split_first()
        .ok_or_else(|| anyhow!("No command given"))?;

    let status = Command::new(program)
        .args(rest)
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| anyhow!("failed to start `{}`: {}", program, e))?;

    if status.success() {
        Ok(())
    } else {
        Err(anyhow!("`{}` exited with {}", program, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> RunArgs {
        use clap::Parser;
        let mut argv = vec!["retrying", "run"];
        argv.extend_from_slice(extra);
        argv.extend_from_slice(&["--", "true"]);
        match crate::cli::Cli::try_parse_from(argv).unwrap().command {
            crate::cli::Commands::Run(args) => args,
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_file_values() {
        let mut policy = RetryConfig {
            max_attempts: 2,
            wait_fixed_ms: Some(100),
            ..RetryConfig::default()
        };

        apply_overrides(
            &mut policy,
            &args(&["--attempts", "7", "--wait-random-ms", "5", "9", "--all-threads"]),
        );

        assert_eq!(policy.max_attempts, 7);
        assert_eq!(policy.wait_fixed_ms, Some(100));
        assert_eq!(policy.wait_random_ms, Some(WaitRandomConfig { min: 5, max: 9 }));
        assert!(policy.all_threads);
    }

    #[test]
    fn test_no_flags_keep_file_values() {
        let original = RetryConfig {
            max_attempts: 4,
            max_delay_ms: Some(1000),
            ..RetryConfig::default()
        };
        let mut policy = original.clone();
        apply_overrides(&mut policy, &args(&[]));
        assert_eq!(policy, original);
    }

    #[tokio::test]
    async fn test_run_once_reports_exit_status() {
        assert!(run_once(&["true".to_string()]).await.is_ok());

        let err = run_once(&["false".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("exited with"), "{}", err);
    }

    #[tokio::test]
    async fn test_run_once_missing_program() {
        let err = run_once(&["definitely-not-a-real-program-xyz".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to start"), "{}", err);
    }
}
