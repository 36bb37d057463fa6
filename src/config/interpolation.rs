//! Reference expressions inside string values.
//!
//! `"${algo.rollout_steps}"` is a whole-value reference and resolves to the
//! referenced value with its type. `"runs/${exp_name}/ckpt"` embeds references
//! in a string; each must resolve to a scalar. `\${` produces a literal `${`.

use super::path::ConfigPath;

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Literal(String),
    Reference(ConfigPath),
}

/// A string value parsed once into literal text and reference paths.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolation {
    source: String,
    parts: Vec<Part>,
}

impl Interpolation {
    /// Parse `text`. Errors describe the malformed expression.
    pub fn parse(text: &str) -> Result<Self, String> {
        let parts = Parser::new(text).parse()?;
        Ok(Self {
            source: text.to_string(),
            parts,
        })
    }

    /// The original text, used when an unresolved tree is printed.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// The target path if the whole string is a single reference.
    pub fn whole_reference(&self) -> Option<&ConfigPath> {
        match self.parts.as_slice() {
            [Part::Reference(path)] => Some(path),
            _ => None,
        }
    }

    pub fn references(&self) -> impl Iterator<Item = &ConfigPath> {
        self.parts.iter().filter_map(|part| match part {
            Part::Reference(path) => Some(path),
            Part::Literal(_) => None,
        })
    }

    /// The unescaped text when there are no references, otherwise `self` back.
    pub fn into_literal(self) -> Result<String, Self> {
        if self.references().next().is_some() {
            return Err(self);
        }
        Ok(self
            .parts
            .into_iter()
            .filter_map(|part| match part {
                Part::Literal(text) => Some(text),
                Part::Reference(_) => None,
            })
            .collect())
    }
}

/// Recursive-descent parser over `text := (escape | reference | char)*`.
struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn parse(mut self) -> Result<Vec<Part>, String> {
        let mut parts = Vec::new();
        let mut literal = String::new();

        while let Some(c) = self.rest().chars().next() {
            if self.rest().starts_with("\\${") {
                literal.push_str("${");
                self.pos += 3;
            } else if self.rest().starts_with("${") {
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Reference(self.reference()?));
            } else {
                literal.push(c);
                self.pos += c.len_utf8();
            }
        }

        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Ok(parts)
    }

    fn reference(&mut self) -> Result<ConfigPath, String> {
        let start = self.pos;
        self.pos += 2;
        let body_start = self.pos;
        loop {
            match self.rest().chars().next() {
                None => {
                    return Err(format!(
                        "unterminated reference starting at '{}'",
                        &self.text[start..]
                    ));
                }
                Some('}') => break,
                Some('$') if self.rest().starts_with("${") => {
                    return Err("nested references are not supported".to_string());
                }
                Some(c) => self.pos += c.len_utf8(),
            }
        }
        let body = &self.text[body_start..self.pos];
        self.pos += 1;
        if body.contains(':') {
            return Err(format!("resolver expressions are not supported: '${{{}}}'", body));
        }
        ConfigPath::parse(body).map_err(|e| e.to_string())
    }
}
