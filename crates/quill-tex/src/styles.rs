//! Stylesheet bundle shipped alongside generated LaTeX fragments.

use quill_markup::escape_html;

use crate::traits::GeneratorOptions;

/// KaTeX stylesheet matching the KaTeX release bundled by the `katex` crate.
pub const DEFAULT_KATEX_STYLESHEET: &str =
    "https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.css";

/// Build the `<link>`/`<style>` bundle a generated fragment needs.
pub fn styles_and_scripts(options: &GeneratorOptions) -> String {
    let mut bundle = format!(
        "<link type=\"text/css\" rel=\"stylesheet\" href=\"{}\">",
        escape_html(&options.katex_stylesheet)
    );

    match &options.asset_base {
        Some(base) => {
            bundle.push_str(&format!(
                "<link type=\"text/css\" rel=\"stylesheet\" href=\"{}article.css\">",
                escape_html(base)
            ));
        }
        None => {
            bundle.push_str("<style>");
            bundle.push_str(ARTICLE_CSS);
            bundle.push_str("</style>");
        }
    }

    bundle
}

/// Article layout for generated documents.
pub const ARTICLE_CSS: &str = r#"/* quill article layout */

.quill-tex {
  font-family: "Latin Modern Roman", "Computer Modern Serif", Georgia, serif;
  font-size: 1rem;
  line-height: 1.5;
  color: #111;
  max-width: 46rem;
  margin: 0 auto;
  padding: 1rem 1.5rem;
  text-align: justify;
}

.quill-tex.hyphenate {
  hyphens: auto;
  -webkit-hyphens: auto;
}

.quill-tex p {
  margin: 0 0 0.75em;
  text-indent: 1.5em;
}

.quill-tex h2 + p,
.quill-tex h3 + p,
.quill-tex h4 + p,
.quill-tex .titlepage + p,
.quill-tex p.noindent {
  text-indent: 0;
}

.quill-tex .titlepage {
  text-align: center;
  margin: 1rem 0 2rem;
}

.quill-tex .titlepage .title {
  font-size: 1.75rem;
  font-weight: normal;
  margin: 0 0 1rem;
}

.quill-tex .titlepage .author,
.quill-tex .titlepage .date {
  font-size: 1.1rem;
  margin: 0.5rem 0;
}

.quill-tex h2,
.quill-tex h3,
.quill-tex h4,
.quill-tex h5 {
  font-weight: bold;
  margin: 1.5em 0 0.75em;
}

.quill-tex h2 { font-size: 1.4rem; }
.quill-tex h3 { font-size: 1.2rem; }
.quill-tex h4 { font-size: 1.05rem; }
.quill-tex h5 { font-size: 1rem; display: inline; margin-right: 1em; }

.quill-tex .section-number {
  margin-right: 1em;
}

.quill-tex .bf { font-weight: bold; }
.quill-tex .it { font-style: italic; }
.quill-tex .tt { font-family: "Latin Modern Mono", monospace; }
.quill-tex .sf { font-family: "Latin Modern Sans", sans-serif; }
.quill-tex .sc { font-variant: small-caps; }
.quill-tex .up { font-style: normal; }
.quill-tex .md { font-weight: normal; }
.quill-tex .rm { font-family: inherit; }
.quill-tex .underline { text-decoration: underline; }

.quill-tex .abstract {
  margin: 1.5em 3em;
  font-size: 0.95rem;
}

.quill-tex .abstract .abstract-title {
  text-align: center;
  font-weight: bold;
  text-indent: 0;
}

.quill-tex blockquote {
  margin: 0.75em 2.5em;
}

.quill-tex .center { text-align: center; }
.quill-tex .flushleft { text-align: left; }
.quill-tex .flushright { text-align: right; }

.quill-tex .center p,
.quill-tex .flushleft p,
.quill-tex .flushright p,
.quill-tex li p,
.quill-tex dd p {
  text-indent: 0;
}

.quill-tex pre.verbatim {
  font-family: "Latin Modern Mono", monospace;
  white-space: pre;
  text-align: left;
  margin: 0.75em 0;
}

.quill-tex .equation {
  display: flex;
  align-items: center;
  justify-content: center;
  position: relative;
  margin: 0.75em 0;
}

.quill-tex .equation-number {
  position: absolute;
  right: 0;
}

.quill-tex .latex-logo .a {
  text-transform: uppercase;
  font-size: 0.75em;
  vertical-align: 0.25em;
  margin-left: -0.36em;
  margin-right: -0.15em;
}

.quill-tex .latex-logo .e,
.quill-tex .tex-logo .e {
  text-transform: uppercase;
  vertical-align: -0.5ex;
  margin-left: -0.1667em;
  margin-right: -0.125em;
}

.quill-tex .footnotes {
  margin-top: 2em;
  border-top: 1px solid #999;
  font-size: 0.85rem;
}

.quill-tex .footnotes p {
  text-indent: 0;
  margin: 0;
}
"#;
