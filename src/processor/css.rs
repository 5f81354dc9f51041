//! Stylesheet processors.

use crate::normalize::UrlNormalizer;
use crate::utils::url::dir_of;

use super::minify::minify_css;
use super::{CommandOutput, Outcome, ProcessContext, Processor, ProcessorError, ProcessorSpec, Selector};

pub static YUI_CSS: ProcessorSpec = ProcessorSpec {
    label: "yui-css",
    program: "yuicompressor",
    command: "{program} {options} {infile}",
    output: CommandOutput::Stdout,
};

/// Rewrites `url()`/`@import` references to their fingerprinted names.
///
/// References under the static URL whose key is in the table become
/// `root_url + hashed`; everything else keeps its resolved absolute path.
#[derive(Debug, Clone)]
pub struct CssUrls {
    selector: Selector,
}

impl CssUrls {
    pub fn new(selector: Selector) -> Self {
        Self { selector }
    }
}

impl Processor for CssUrls {
    fn label(&self) -> &str {
        "css-urls"
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<Outcome, ProcessorError> {
        let text = ctx.read_text()?;
        let normalizer = UrlNormalizer::css(ctx.root_url);
        let rewritten = normalizer.normalize(&text, dir_of(ctx.name), |r| {
            match r.key.and_then(|key| ctx.table.get(key)) {
                Some(hashed) => format!("{}{hashed}", ctx.root_url),
                None => r.url.to_string(),
            }
        });

        if rewritten == text {
            return Ok(Outcome::Skipped);
        }
        ctx.save(rewritten.as_bytes())
    }
}

/// In-process CSS minifier.
#[derive(Debug, Clone)]
pub struct CssMin {
    selector: Selector,
}

impl CssMin {
    pub fn new(selector: Selector) -> Self {
        Self { selector }
    }
}

impl Processor for CssMin {
    fn label(&self) -> &str {
        "css-min"
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<Outcome, ProcessorError> {
        let text = ctx.read_text()?;
        if text.trim().is_empty() {
            return Ok(Outcome::Skipped);
        }
        ctx.save(minify_css(&text)?.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::tests::{Fixture, selector};
    use crate::storage::Storage;

    #[test]
    fn test_css_urls_uses_fingerprints() {
        let mut fx = Fixture::new();
        fx.table.insert("img/x.png".into(), "img/x.0123456789ab.png".into());
        fx.storage
            .save(
                "css/site.aaaaaaaaaaaa.css",
                b"a{b:url(../img/x.png?#iefix)}c{d:url(../img/y.png)}e{f:url(http://h/x.png)}",
            )
            .unwrap();

        let p = CssUrls::new(selector(r"\.css$", -1000));
        let outcome = p.process(&fx.ctx("css/site.aaaaaaaaaaaa.css")).unwrap();
        assert!(matches!(outcome, Outcome::Applied { .. }));

        let css = fx.storage.read("css/site.aaaaaaaaaaaa.css").unwrap();
        assert_eq!(
            String::from_utf8(css).unwrap(),
            "a{b:url(/static/img/x.0123456789ab.png?#iefix)}c{d:url(/static/img/y.png)}e{f:url(http://h/x.png)}"
        );
    }

    #[test]
    fn test_css_urls_skips_when_unchanged() {
        let fx = Fixture::new();
        fx.storage.save("css/a.css", b"a{color:red}").unwrap();
        let p = CssUrls::new(selector(r"\.css$", -1000));
        assert_eq!(p.process(&fx.ctx("css/a.css")).unwrap(), Outcome::Skipped);
    }

    #[test]
    fn test_css_min() {
        let fx = Fixture::new();
        fx.storage.save("css/a.css", b"body {\n  color: red;\n}\n").unwrap();
        let p = CssMin::new(selector(r"\.css$", 0));

        p.process(&fx.ctx("css/a.css")).unwrap();
        assert_eq!(fx.storage.read("css/a.css").unwrap(), b"body{color:red}");
    }
}
