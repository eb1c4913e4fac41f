use super::{Exit, connect};
use crate::config::{Effective, ProvisionArgs};
use crate::error::ForwarderError;

pub async fn run(args: ProvisionArgs) -> Result<Exit, ForwarderError> {
    let eff = Effective::new(&args.common)?;
    let kafka = connect(&eff).await?;

    let report = pipeline::provision_topics(&kafka.provisioner, &eff.topic_specs()?, &eff.startup_retry).await;
    for (topic, error) in &report.failed {
        eprintln!("{topic}: {error}");
    }
    Ok(if report.all_ready() {
        Exit::Success
    } else {
        Exit::Incomplete
    })
}
