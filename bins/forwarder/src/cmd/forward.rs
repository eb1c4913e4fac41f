use pipeline::{ForwardPipeline, follow};

use super::{Exit, connect, shutdown_token};
use crate::config::{Effective, ForwardArgs};
use crate::error::ForwarderError;

pub async fn run(args: ForwardArgs) -> Result<Exit, ForwarderError> {
    let eff = Effective::new(&args.common)?;
    tracing::info!(
        source = %eff.source_topic,
        target = %eff.target_topic,
        group = %eff.group_id,
        timeout_secs = eff.timeout.as_secs(),
        "forwarder starting"
    );

    let kafka = connect(&eff).await?;
    let report = pipeline::provision_topics(&kafka.provisioner, &eff.topic_specs()?, &eff.startup_retry).await;
    if !report.all_ready() {
        tracing::warn!(failed = report.failed.len(), "continuing without confirmed topics");
    }

    let pipeline = ForwardPipeline::new(kafka.stages(&eff), eff.route())
        .with_write_retry(eff.write_retry.clone());
    let token = shutdown_token();

    if args.follow {
        let mut follow_cfg = eff.follow.clone();
        if args.max_runs.is_some() {
            follow_cfg.max_runs = args.max_runs;
        }
        let summary = follow(&pipeline, eff.timeout, &follow_cfg, &token).await?;
        if args.json {
            println!("{}", serde_json::to_string(&summary)?);
        }
        return Ok(Exit::Success);
    }

    let outcome = pipeline.run(eff.timeout, &token).await;
    if args.json {
        println!("{}", outcome.to_json()?);
    }
    Ok(if outcome.is_forwarded() {
        Exit::Success
    } else {
        Exit::Incomplete
    })
}
