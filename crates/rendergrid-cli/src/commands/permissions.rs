use std::path::Path;

use serde_json::{Value, json};

use rendergrid_core::ErrorKind;
use rendergrid_deploy::{Capability, Operation};

use crate::context::Context;
use crate::output::{CliError, CliResult};

/// Simulate the capabilities `operation` needs, or every known capability.
///
/// Nothing is mutated; a denied capability fails the command with
/// `InsufficientPermissions` and the full result list as data.
pub async fn validate(
    config_path: &Path,
    region: Option<&str>,
    operation: Option<Operation>,
) -> CliResult<Value> {
    let ctx = Context::load(config_path, region)?;
    let required = operation.map_or(Capability::ALL, Operation::required_capabilities);
    let results = ctx
        .validator()
        .simulate(&ctx.config.credentials, required)
        .await?;

    let denied: Vec<Capability> = results
        .iter()
        .filter(|r| !r.allowed)
        .map(|r| r.capability)
        .collect();
    let data = json!({
        "principal": ctx.config.credentials.principal,
        "operation": operation,
        "results": results,
    });
    if let Some(first) = denied.first() {
        let scope = operation.map_or_else(|| "all operations".to_string(), |op| op.to_string());
        return Err(CliError::new(
            ErrorKind::InsufficientPermissions,
            format!(
                "{} of {} capabilities denied for {scope}, first: {first}",
                denied.len(),
                results.len()
            ),
        )
        .with_data(data));
    }
    Ok(data)
}
