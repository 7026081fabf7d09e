use std::cmp;
use std::fmt::Display;

use itertools::Itertools as _;

use super::document_cursor::{DocumentCursor, DocumentRange, Ranged};

/// Annotator that can display source code with annotations
pub struct DocumentAnnotator {
    pub show_line_numbers: bool,
    pub show_location: bool,
    pub lines_before: usize,
    pub underline_char: char,
    pub tab_width: usize,
    pub label: Option<String>,
}

impl DocumentAnnotator {
    pub fn new() -> Self {
        Self {
            show_line_numbers: true,
            show_location: false,
            lines_before: 0,
            underline_char: '^',
            tab_width: 4,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_lines_before(mut self, n: usize) -> Self {
        self.lines_before = n;
        self
    }

    pub fn with_location(mut self) -> Self {
        self.show_location = true;
        self
    }

    #[cfg(test)]
    pub fn without_line_numbers(mut self) -> Self {
        self.show_line_numbers = false;
        self
    }

    pub fn annotate<A>(
        &self,
        filename: Option<&str>,
        annotations: impl IntoIterator<Item = A>,
    ) -> String
    where
        A: Display + Ranged,
    {
        let annotations: Vec<A> = annotations.into_iter().collect();

        let source = match annotations.first() {
            Some(first) => first.range().full_source(),
            None => return String::new(),
        };

        let mut output = String::new();
        let lines: Vec<Option<DocumentRange>> = DocumentCursor::new(source.to_string())
            .chunk_by(|range| range.start_position().line)
            .into_iter()
            .map(|(_, group)| group.filter(|s| s.ch() != '\n').reduce(|a, b| a.to(b)))
            .collect();

        for (i, annotation) in annotations.into_iter().enumerate() {
            if i > 0 {
                output.push('\n');
            }

            match self.label {
                Some(ref label) => output.push_str(&format!("{}: {}\n", label, annotation)),
                None => output.push_str(&format!("{}\n", annotation)),
            }

            if self.show_location {
                let position = annotation.range().start_position();
                match filename {
                    Some(filename) => output.push_str(&format!(
                        "  --> {} (line {}, col {})\n",
                        filename,
                        position.line + 1,
                        position.column + 1
                    )),
                    None => output.push_str(&format!(
                        "  --> (line {}, col {})\n",
                        position.line + 1,
                        position.column + 1
                    )),
                }
            }

            self.format_annotation(&mut output, &lines, annotation.range());
        }

        output
    }

    fn format_annotation(
        &self,
        output: &mut String,
        lines: &[Option<DocumentRange>],
        range: &DocumentRange,
    ) {
        if lines.is_empty() {
            return;
        }
        let max_line_col_width = lines.len().to_string().len();

        let start = range.start_position();
        // Empty ranges and line breaks are shown as a caret after the line.
        let is_point = range.start() == range.end() || range.as_str() == "\n";
        let end_line = if is_point {
            start.line
        } else {
            range.end_position().line
        };
        let first_line = start.line.saturating_sub(self.lines_before);
        let last_line = cmp::min(lines.len() - 1, end_line);

        for (i, line) in lines.iter().enumerate() {
            if i < first_line || i > last_line {
                continue;
            }

            if self.show_line_numbers {
                output.push_str(&format!("{:width$} | ", i + 1, width = max_line_col_width));
            }
            if let Some(line) = line {
                output.push_str(&self.expand_tabs(line.as_str()));
            }
            output.push('\n');

            let Some(line) = line else { continue };
            let underline = if is_point {
                (i == start.line).then(|| {
                    let indent: usize = line
                        .cursor()
                        .filter(|c| c.end() <= range.start())
                        .map(|c| self.char_display_width(c.ch()))
                        .sum();
                    format!("{}{}", " ".repeat(indent), self.underline_char)
                })
            } else {
                line.intersection(range).map(|intersection| {
                    let mut text = String::new();
                    for c in line.cursor() {
                        if intersection.contains(&c) {
                            text.push_str(
                                &self
                                    .underline_char
                                    .to_string()
                                    .repeat(self.char_display_width(c.ch())),
                            );
                        } else if c.start() < intersection.start() {
                            text.push_str(&" ".repeat(self.char_display_width(c.ch())));
                        }
                    }
                    text
                })
            };
            if let Some(underline) = underline {
                if self.show_line_numbers {
                    output.push_str(&format!("{:width$} | ", "", width = max_line_col_width));
                }
                output.push_str(&underline);
                output.push('\n');
            }
        }
    }

    fn char_display_width(&self, ch: char) -> usize {
        use unicode_width::UnicodeWidthChar;
        if ch == '\t' {
            self.tab_width
        } else {
            ch.width().unwrap_or(0)
        }
    }

    fn expand_tabs(&self, text: &str) -> String {
        let tab_replacement = " ".repeat(self.tab_width);
        text.replace('\t', &tab_replacement)
    }
}

impl Default for DocumentAnnotator {
    fn default() -> Self {
        Self::new()
    }
}
