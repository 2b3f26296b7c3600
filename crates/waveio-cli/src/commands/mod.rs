//! CLI command implementations.

pub mod devices;
pub mod monitor;
pub mod record;
pub mod sine;

/// Resolves the `--backend` flag, falling back to `Context::connect`'s own
/// `WAVEIO_BACKEND`/priority-order search when unset.
pub(crate) fn connect(ctx: &std::sync::Arc<waveio::Context>, backend: Option<&str>) -> anyhow::Result<()> {
    match backend {
        Some(name) => {
            let backend = waveio::Backend::parse_name(name)
                .ok_or_else(|| anyhow::anyhow!("unknown backend '{name}'"))?;
            ctx.connect_backend(backend)?;
        }
        None => ctx.connect()?,
    }
    Ok(())
}
