// CLI commands for talking to a running judge through Redis
use crate::generator::{build_job, JobSpec};
use anyhow::{Context, Result};
use judge_common::redis::{queue_key, result_key, RedisQueue};
use judge_common::types::{JobKind, RERUN_DESTINATION};
use std::fs;
use std::path::Path;

const CLI_CLIENT_ID: &str = "judge-cli";

async fn connect(redis_url: &str) -> Result<RedisQueue> {
    RedisQueue::connect(redis_url, CLI_CLIENT_ID)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", redis_url))
}

/// Read a source file and push it as a job of the requested kind
pub async fn submit(redis_url: &str, file: &Path, mut spec: JobSpec) -> Result<()> {
    spec.source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let job = build_job(&spec)?;
    let queue = connect(redis_url).await?;
    queue.push_job(&job).await.context("Failed to queue job")?;

    println!("🚀 Job queued");
    println!("  id:          {}", job.job_id());
    println!("  kind:        {}", job.kind());
    println!("  language:    {}", job.language());
    println!("  queue:       {}", queue_key(job.kind()));
    println!("  result list: {}", result_key(job.destination()));
    println!("\n💡 Fetch the result with: judge-cli results --kind {}{}",
             job.kind(),
             if job.is_rerun() { " --rerun" } else { "" });

    Ok(())
}

/// Pop and pretty-print up to `count` published results
pub async fn results(redis_url: &str, kind: JobKind, rerun: bool, count: usize, wait_secs: f64) -> Result<()> {
    let destination = if rerun {
        RERUN_DESTINATION
    } else {
        kind.result_destination()
    };
    let queue = connect(redis_url).await?;

    let mut received = 0;
    while received < count {
        let payload = queue
            .pop_result(destination, wait_secs)
            .await
            .context("Failed to read results")?;

        let Some(payload) = payload else {
            break;
        };
        received += 1;
        println!("{}", pretty(&payload));
    }

    if received == 0 {
        println!("No results on {} after {}s", result_key(destination), wait_secs);
    } else {
        println!("\n✅ {} result(s) from {}", received, result_key(destination));
    }

    Ok(())
}

/// Indent JSON payloads; anything else is printed as-is
fn pretty(payload: &str) -> String {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| payload.to_string())
}
