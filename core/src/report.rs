use std::path::Path;

use anyhow::{Context, Result};
use inventory_api::Fixture;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Write a value as a single line of JSON.
pub async fn write_json_line<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let s = serde_json::to_string(value)?;
    writer.write_all(s.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read an inventory snapshot from a JSON file.
pub async fn read_fixture(path: &Path) -> Result<Fixture> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading fixture {}", path.display()))?;
    let fixture = serde_json::from_slice(&bytes).context("invalid fixture")?;
    Ok(fixture)
}
