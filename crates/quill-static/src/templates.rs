//! Templates for frame documents and the frame resize hook.

use minijinja::{context, Environment};

/// Context for rendering a frame document.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FrameContext {
    /// Document title
    pub title: Option<String>,
    /// Style/script bundle followed by the generated fragment
    pub body: String,
}

/// Timings baked into a resize hook.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ResizeContext {
    /// Delay after the frame loads before the first measurement
    pub settle_delay_ms: u64,
    /// Delay after a frame resize before measuring again
    pub resize_debounce_ms: u64,
}

/// Template engine using minijinja.
pub struct FrameTemplates {
    env: Environment<'static>,
}

impl FrameTemplates {
    /// Create a template engine with the built-in templates.
    pub fn new() -> Self {
        let mut env = Environment::new();

        env.add_template("frame.html", FRAME_TEMPLATE)
            .expect("Failed to add frame template");
        env.add_template("resize.html", RESIZE_TEMPLATE)
            .expect("Failed to add resize template");

        Self { env }
    }

    /// Render the document placed in a frame's `srcdoc`.
    pub fn render_frame(&self, frame: &FrameContext) -> Result<String, minijinja::Error> {
        let tmpl = self.env.get_template("frame.html")?;

        tmpl.render(context! {
            title => &frame.title,
            body => &frame.body,
        })
    }

    /// Render the inline script that keeps a frame sized to its content.
    pub fn render_resize_hook(&self, timing: &ResizeContext) -> Result<String, minijinja::Error> {
        let tmpl = self.env.get_template("resize.html")?;

        tmpl.render(context! {
            settle_delay_ms => timing.settle_delay_ms,
            resize_debounce_ms => timing.resize_debounce_ms,
        })
    }
}

impl Default for FrameTemplates {
    fn default() -> Self {
        Self::new()
    }
}

const FRAME_TEMPLATE: &str = r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
{% if title %}<title>{{ title }}</title>
{% endif %}</head>
<body>
{{ body | safe }}
</body>
</html>"##;

// Inserted directly after the iframe, so the iframe is the script's previous
// element sibling while the page is parsed.
const RESIZE_TEMPLATE: &str = r##"<script>
(function () {
  var frame = document.currentScript && document.currentScript.previousElementSibling;
  if (!frame || frame.tagName !== 'IFRAME') return;

  var pending = null;

  function resize() {
    var doc = frame.contentWindow && frame.contentWindow.document;
    if (!doc || !doc.body) return;
    frame.style.width = '100%';
    frame.style.height = doc.body.scrollHeight + 'px';
  }

  function schedule(delay) {
    if (pending !== null) clearTimeout(pending);
    pending = setTimeout(function () {
      pending = null;
      resize();
    }, delay);
  }

  frame.addEventListener('load', function () {
    schedule({{ settle_delay_ms }});
    if (typeof ResizeObserver === 'function') {
      new ResizeObserver(function () {
        schedule({{ resize_debounce_ms }});
      }).observe(frame);
    } else {
      window.addEventListener('resize', function () {
        schedule({{ resize_debounce_ms }});
      });
    }
  });
})();
</script>"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_frame_document() {
        let templates = FrameTemplates::new();

        let html = templates
            .render_frame(&FrameContext {
                title: Some("A & B".to_string()),
                body: "<style>p{}</style><div class=\"quill-tex\"></div>".to_string(),
            })
            .unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>A &amp; B</title>"));
        assert!(html.contains("<body>\n<style>p{}</style><div class=\"quill-tex\"></div>\n</body>"));
    }

    #[test]
    fn omits_missing_title() {
        let html = FrameTemplates::new()
            .render_frame(&FrameContext {
                title: None,
                body: String::new(),
            })
            .unwrap();

        assert!(!html.contains("<title>"));
    }

    #[test]
    fn bakes_timings_into_resize_hook() {
        let script = FrameTemplates::new()
            .render_resize_hook(&ResizeContext {
                settle_delay_ms: 10,
                resize_debounce_ms: 50,
            })
            .unwrap();

        assert!(script.starts_with("<script>"));
        assert!(script.ends_with("</script>"));
        assert!(script.contains("schedule(10);"));
        assert!(script.contains("schedule(50);"));
        assert!(script.contains("frame.style.width = '100%';"));
        assert!(script.contains("doc.body.scrollHeight + 'px'"));
        assert!(script.contains("new ResizeObserver"));
    }
}
