//! Math rendering through KaTeX.

use katex::{OptsBuilder, OutputType};

/// Render a math expression to HTML.
///
/// Display math comes back wrapped in a `katex-display` block, inline math
/// as a `katex` span. Invalid input is an error rather than red output.
pub fn render_math(source: &str, display: bool) -> Result<String, String> {
    let mut builder = OptsBuilder::default();
    builder.display_mode(display);
    builder.output_type(OutputType::Html);
    builder.throw_on_error(true);

    let opts = builder
        .build()
        .map_err(|err| format!("failed to build KaTeX options: {err}"))?;

    katex::render_with_opts(source.trim(), opts).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_inline_and_display() {
        let inline = render_math("x^2", false).unwrap();
        let display = render_math("x^2", true).unwrap();

        assert!(inline.contains("katex"));
        assert!(display.contains("katex-display"));
        assert_ne!(inline, display);
    }

    #[test]
    fn rejects_invalid_math() {
        assert!(render_math(r"\frac{", false).is_err());
    }
}
