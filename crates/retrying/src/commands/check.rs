//! Check command

use anyhow::{anyhow, bail, Result};
use camino::Utf8Path;
use retrying_core::config::DEFAULT_POLICY_NAME;
use retrying_core::types::RetryPolicy;

use crate::cli::CheckArgs;
use crate::output;

pub fn run(args: CheckArgs, config: Option<&Utf8Path>) -> Result<()> {
    let (path, policies) = super::load_policies(config)?
        .ok_or_else(|| anyhow!("No policy file found (looked for retrying.yaml)"))?;

    output::info(&format!("Checking {}", path));

    if let Some(name) = args.policy {
        if !policies.defines(&name) {
            bail!("Policy '{}' is not defined in {}", name, path);
        }
        let policy = policies.resolve(Some(name.as_str()))?;
        print_policy(&name, &policy);
        output::success(&format!("Policy '{}' is valid", name));
        return Ok(());
    }

    let invalid = policies.invalid_policies();
    if !invalid.is_empty() {
        for (name, errors) in &invalid {
            for error in errors {
                output::error(&format!("{}: {}", name, error));
            }
        }
        bail!("{} invalid polic{}", invalid.len(), if invalid.len() == 1 { "y" } else { "ies" });
    }

    let default = policies.resolve(None)?;
    print_policy(DEFAULT_POLICY_NAME, &default);
    for name in policies.operations.keys() {
        let policy = policies.resolve(Some(name.as_str()))?;
        print_policy(name, &policy);
    }
    output::success(&format!(
        "{} policies valid",
        policies.operations.len() + 1
    ));
    Ok(())
}

fn print_policy(name: &str, policy: &RetryPolicy) {
    output::header(&format!("Policy: {}", name));
    output::kv("max attempts", &policy.max_attempts.to_string());
    output::kv(
        "max delay",
        &policy
            .max_delay
            .map(|d| format!("{}ms", d.as_millis()))
            .unwrap_or_else(|| "none".to_string()),
    );
    output::kv("wait", &describe_wait(policy));
    output::kv(
        "stack size",
        &format!(
            "{} bytes{}",
            policy.trace.buffer_size,
            if policy.trace.all_threads { ", all threads" } else { "" }
        ),
    );
}

fn describe_wait(policy: &RetryPolicy) -> String {
    if !policy.wait_fixed.is_zero() {
        return format!("fixed {}ms", policy.wait_fixed.as_millis());
    }
    match policy.wait_random {
        Some((min, max)) => format!("random {}..{}ms", min.as_millis(), max.as_millis()),
        None => "none".to_string(),
    }
}
