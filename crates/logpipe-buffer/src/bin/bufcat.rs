//! Drains a persistent-buffer ring file to stdout, oldest batch first.

use anyhow::{bail, Context, Result};
use logpipe_buffer::PersistentBuffer;
use std::path::PathBuf;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args_os().skip(1);
    let (Some(path), None) = (args.next(), args.next()) else {
        bail!("usage: bufcat <ring-file>");
    };
    let path = PathBuf::from(path);

    let mut buf = PersistentBuffer::open(&path)
        .with_context(|| format!("opening ring {}", path.display()))?;

    let mut batches = 0usize;
    let mut records = 0usize;
    while let Ok(batch) = buf.pop() {
        batches += 1;
        for rec in &batch {
            records += 1;
            println!(
                "{}\t{}\t{}\t{}",
                rec.ts.rfc3339_nano(),
                rec.tag,
                rec.src,
                String::from_utf8_lossy(&rec.data)
            );
        }
    }

    tracing::info!(batches, records, "ring drained");
    Ok(())
}
