//! Gzip sidecars (`name.ext.gz`) for text-like assets.

use std::fs::{self, File};
use std::io::{self, BufWriter};

use flate2::Compression;
use flate2::write::GzEncoder;

use super::{Outcome, ProcessContext, Processor, ProcessorError, Selector};

pub const DEFAULT_LEVEL: u32 = 5;

#[derive(Debug, Clone)]
pub struct Gzip {
    selector: Selector,
    level: u32,
}

impl Gzip {
    pub fn new(selector: Selector, level: u32) -> Self {
        Self {
            selector,
            level: level.min(9),
        }
    }
}

impl Processor for Gzip {
    fn label(&self) -> &str {
        "gzip"
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<Outcome, ProcessorError> {
        let source = ctx.storage.path(ctx.name);
        let sidecar = format!("{}.gz", ctx.name);
        let target = ctx.storage.path(&sidecar);
        let io_err = |e| ProcessorError::io(&target, e);

        let mut input = File::open(&source).map_err(|e| ProcessorError::io(&source, e))?;
        let output = File::create(&target).map_err(io_err)?;
        let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::new(self.level));
        io::copy(&mut input, &mut encoder).map_err(io_err)?;
        encoder.finish().map_err(io_err)?.into_inner().map_err(|e| io_err(e.into_error()))?;

        let permissions = input
            .metadata()
            .map_err(|e| ProcessorError::io(&source, e))?
            .permissions();
        fs::set_permissions(&target, permissions).map_err(io_err)?;

        Ok(Outcome::Applied { output: sidecar })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::tests::{Fixture, selector};
    use crate::storage::Storage;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::os::unix::fs::PermissionsExt;

    const MATCH: &str = r"\.(htm|html|js|css|txt|eot|ttf|svg)";

    #[test]
    fn test_gzip_sidecar_roundtrips_and_keeps_mode() {
        let fx = Fixture::new();
        fx.storage.save("css/a.0123456789ab.css", b"body{color:red}").unwrap();
        let path = fx.storage.path("css/a.0123456789ab.css");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        let p = Gzip::new(selector(MATCH, 1000), DEFAULT_LEVEL);
        let outcome = p.process(&fx.ctx("css/a.0123456789ab.css")).unwrap();
        assert_eq!(
            outcome,
            Outcome::Applied {
                output: "css/a.0123456789ab.css.gz".into()
            }
        );

        let gz = fx.storage.path("css/a.0123456789ab.css.gz");
        let mut text = String::new();
        GzDecoder::new(File::open(&gz).unwrap()).read_to_string(&mut text).unwrap();
        assert_eq!(text, "body{color:red}");
        assert_eq!(gz.metadata().unwrap().permissions().mode() & 0o777, 0o640);
    }

    #[test]
    fn test_gzip_match() {
        let p = Gzip::new(selector(MATCH, 1000), 12);
        assert!(p.applies_to("js/app.js"));
        assert!(p.applies_to("index.html"));
        assert!(!p.applies_to("img/a.png"));
        assert_eq!(p.level, 9);
    }
}
