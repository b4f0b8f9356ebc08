//! Command line of a destination: `write --config <file> --catalog <file>`

use anyhow::{bail, Context};

#[derive(Debug, Clone, PartialEq)]
pub struct WriteArgs {
    pub config: String,
    pub catalog: String,
}

impl WriteArgs {
    pub fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut args = args.into_iter();

        match args.next().as_deref() {
            Some("write") => {}
            Some(other) => bail!("unsupported command '{}', expected 'write'", other),
            None => bail!("missing command, expected 'write'"),
        }

        let mut config = None;
        let mut catalog = None;
        while let Some(flag) = args.next() {
            let value = args
                .next()
                .with_context(|| format!("missing value for {}", flag))?;
            match flag.as_str() {
                "--config" => config = Some(value),
                "--catalog" => catalog = Some(value),
                other => bail!("unknown argument '{}'", other),
            }
        }

        Ok(Self {
            config: config.context("--config is required")?,
            catalog: catalog.context("--catalog is required")?,
        })
    }
}
