use anyhow::Result;
use ipguard_common::IpGuardConfigStore;
use schemars::schema_for;

pub(crate) fn command() -> Result<()> {
    let schema = schema_for!(IpGuardConfigStore);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
