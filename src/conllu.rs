//! CoNLL-U file parsing
//!
//! Streams sentences out of CoNLL-U text as owned records. Multiword token
//! ranges and empty nodes are skipped; everything else in the ten columns is
//! kept as written, except FEATS which is split into `Key=Value` pairs.
//!
//! CoNLL-U format: https://universaldependencies.org/format.html

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Lines};
use std::path::Path;
use thiserror::Error;

/// Error during CoNLL-U parsing
#[derive(Debug, Error)]
#[error("Parse error at line {line_num}: {message}")]
pub struct ParseError {
    pub line_num: usize,
    pub message: String,
}

impl ParseError {
    fn new(line_num: usize, message: impl Into<String>) -> Self {
        Self {
            line_num,
            message: message.into(),
        }
    }
}

/// Token line as read from the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub id: usize,
    pub form: String,
    pub lemma: String,
    pub upos: String,
    pub xpos: Option<String>,
    pub feats: Vec<(String, String)>,
    pub head: usize,
    pub deprel: String,
}

/// Sentence as read from the file, before interning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentenceRecord {
    pub sent_id: Option<String>,
    pub text: Option<String>,
    pub tokens: Vec<TokenRecord>,
}

/// CoNLL-U reader that iterates over sentences
pub struct CoNLLUReader<R: BufRead> {
    lines: Lines<R>,
    line_num: usize,
}

impl CoNLLUReader<Box<dyn BufRead>> {
    /// Create a reader from a file path; `.gz` files are decompressed
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let reader: Box<dyn BufRead> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Ok(Self::new(reader))
    }
}

impl CoNLLUReader<Cursor<String>> {
    /// Create a reader from a string
    pub fn from_string(text: &str) -> Self {
        Self::new(Cursor::new(text.to_string()))
    }
}

impl<R: BufRead> CoNLLUReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_num: 0,
        }
    }
}

impl<R: BufRead> Iterator for CoNLLUReader<R> {
    type Item = Result<SentenceRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut sentence = SentenceRecord::default();
        let mut seen_content = false;

        // Read lines until we hit a blank line (sentence boundary) or EOF
        loop {
            let Some(line) = self.lines.next() else {
                if seen_content {
                    break;
                }
                return None;
            };
            self.line_num += 1;

            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(ParseError::new(
                        self.line_num,
                        format!("IO error: {}", e),
                    )));
                }
            };
            let line = line.trim_end_matches(['\r', '\n']);

            if line.trim().is_empty() {
                if seen_content {
                    break;
                }
                continue;
            }
            seen_content = true;

            if let Some(comment) = line.strip_prefix('#') {
                parse_comment(comment, &mut sentence);
                continue;
            }

            match parse_line(line, self.line_num) {
                Ok(Some(token)) => sentence.tokens.push(token),
                Ok(None) => {}
                Err(e) => {
                    // Skip the rest of the broken sentence so iteration can resume
                    self.skip_sentence();
                    return Some(Err(e));
                }
            }
        }

        Some(Ok(sentence))
    }
}

impl<R: BufRead> CoNLLUReader<R> {
    fn skip_sentence(&mut self) {
        for line in self.lines.by_ref() {
            self.line_num += 1;
            match line {
                Ok(line) if line.trim().is_empty() => return,
                Ok(_) => {}
                Err(_) => return,
            }
        }
    }
}

/// Parse a comment line (without its leading `#`)
fn parse_comment(comment: &str, sentence: &mut SentenceRecord) {
    let Some((key, value)) = comment.split_once('=') else {
        return;
    };
    match key.trim() {
        "sent_id" => sentence.sent_id = Some(value.trim().to_string()),
        "text" => sentence.text = Some(value.trim().to_string()),
        _ => {}
    }
}

/// Parse a single CoNLL-U line
///
/// Returns None for multiword tokens and empty nodes.
fn parse_line(line: &str, line_num: usize) -> Result<Option<TokenRecord>, ParseError> {
    let fields: Vec<&str> = line.split('\t').collect();

    if fields.len() != 10 {
        return Err(ParseError::new(
            line_num,
            format!("Expected 10 fields, found {}", fields.len()),
        ));
    }

    // Field 0: ID
    if fields[0].contains(['-', '.']) {
        return Ok(None);
    }
    let id = parse_number(fields[0])
        .ok_or_else(|| ParseError::new(line_num, format!("Invalid ID: {}", fields[0])))?;

    // Field 6: HEAD ("_" only appears in files without a tree)
    let head = if fields[6] == "_" {
        0
    } else {
        parse_number(fields[6])
            .ok_or_else(|| ParseError::new(line_num, format!("Invalid HEAD: {}", fields[6])))?
    };

    let xpos = (fields[4] != "_").then(|| fields[4].to_string());

    Ok(Some(TokenRecord {
        id,
        form: fields[1].to_string(),
        lemma: fields[2].to_string(),
        upos: fields[3].to_string(),
        xpos,
        feats: parse_features(fields[5]),
        head,
        deprel: fields[7].to_string(),
    }))
}

fn parse_number(s: &str) -> Option<usize> {
    let (value, used) =
        <usize as atoi::FromRadix10Checked>::from_radix_10_checked(s.as_bytes());
    if used == s.len() && used > 0 {
        value
    } else {
        None
    }
}

/// Parse FEATS field (key=value|key=value)
fn parse_features(s: &str) -> Vec<(String, String)> {
    if s == "_" {
        return Vec::new();
    }

    s.split('|')
        .filter_map(|pair| {
            let eq_pos = memchr::memchr(b'=', pair.as_bytes())?;
            let (key, value) = (&pair[..eq_pos], &pair[eq_pos + 1..]);
            (!key.is_empty() && !value.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}
