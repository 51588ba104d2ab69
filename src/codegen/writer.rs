//! Indent-aware string builder for Python code generation.
//!
//! Generated Python uses 4-space indentation.

/// Indent-aware string builder that produces formatted Python source.
pub struct CodeWriter {
    buf: String,
    indent_level: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self {
            buf: String::with_capacity(4096),
            indent_level: 0,
        }
    }

    /// Write a complete line (appends newline).
    pub fn line(&mut self, text: &str) {
        for _ in 0..self.indent_level {
            self.buf.push_str("    ");
        }
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    /// Write an empty line.
    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    /// Two empty lines, as between top-level definitions.
    pub fn gap(&mut self) {
        self.blank();
        self.blank();
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    /// Write `text:` and increase indent (e.g. `def f(state):`).
    pub fn block_open(&mut self, text: &str) {
        self.line(&format!("{text}:"));
        self.indent();
    }

    /// End a suite opened with [`block_open`](Self::block_open).
    pub fn block_close(&mut self) {
        self.dedent();
    }

    /// Write `open`, the indented `items`, then `close` at the opening depth.
    pub fn bracketed<I, S>(&mut self, open: &str, items: I, close: &str)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.line(open);
        self.indent();
        for item in items {
            self.line(item.as_ref());
        }
        self.dedent();
        self.line(close);
    }

    /// Consume the writer and return the generated string.
    pub fn finish(self) -> String {
        self.buf
    }
}

impl Default for CodeWriter {
    fn default() -> Self {
        Self::new()
    }
}
