use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

pub const DEFAULT_BLANK: &str = "-";
pub const DEFAULT_SEPARATOR: &str = "|";

#[derive(Error, Debug)]
pub enum VocabularyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Vocabulary is empty")]
    Empty,
    #[error("Symbol {symbol:?} appears at index {first} and again at index {second}")]
    DuplicateSymbol {
        symbol: String,
        first: usize,
        second: usize,
    },
    #[error("Symbol {0:?} is not in the vocabulary")]
    MissingSymbol(String),
    #[error("Token index {index} is outside the vocabulary of size {size}")]
    IndexOutOfRange { index: usize, size: usize },
    #[error("Blank and word separator must be different tokens (both are index {0})")]
    BlankIsSeparator(usize),
    #[error("Line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Ordered token symbols with the blank and word-separator indices used by CTC.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    symbols: Vec<String>,
    index: HashMap<String, usize>,
    blank: usize,
    separator: usize,
}

impl Vocabulary {
    pub fn new(
        symbols: Vec<String>,
        blank_symbol: &str,
        separator_symbol: &str,
    ) -> Result<Self, VocabularyError> {
        let index = Self::build_index(&symbols)?;
        let blank = *index
            .get(blank_symbol)
            .ok_or_else(|| VocabularyError::MissingSymbol(blank_symbol.to_string()))?;
        let separator = *index
            .get(separator_symbol)
            .ok_or_else(|| VocabularyError::MissingSymbol(separator_symbol.to_string()))?;
        Self::assemble(symbols, index, blank, separator)
    }

    pub fn with_indices(
        symbols: Vec<String>,
        blank: usize,
        separator: usize,
    ) -> Result<Self, VocabularyError> {
        let index = Self::build_index(&symbols)?;
        for idx in [blank, separator] {
            if idx >= symbols.len() {
                return Err(VocabularyError::IndexOutOfRange {
                    index: idx,
                    size: symbols.len(),
                });
            }
        }
        Self::assemble(symbols, index, blank, separator)
    }

    /// Loads a token file. Each line holds either a bare symbol (the line number
    /// is its index) or `symbol index`.
    pub fn load<P: AsRef<Path>>(
        path: P,
        blank_symbol: &str,
        separator_symbol: &str,
    ) -> Result<Self, VocabularyError> {
        let content = fs::read_to_string(path.as_ref())?;
        let symbols = Self::parse_symbols(&content)?;
        let vocab = Self::new(symbols, blank_symbol, separator_symbol)?;
        log::info!(
            "Loaded {} tokens from {} (blank={}, separator={})",
            vocab.len(),
            path.as_ref().display(),
            vocab.blank,
            vocab.separator
        );
        Ok(vocab)
    }

    pub fn parse_symbols(content: &str) -> Result<Vec<String>, VocabularyError> {
        let mut indexed = Vec::new();
        let mut sequential = Vec::new();
        let mut first_blank = None;

        for (n, raw) in content.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                first_blank.get_or_insert(n + 1);
                continue;
            }
            // Blank lines are allowed only at the end of the file.
            if let Some(blank) = first_blank {
                return Err(VocabularyError::Parse {
                    line: blank,
                    reason: "blank line inside the token list".to_string(),
                });
            }
            let mut parts = line.split_whitespace();
            let symbol = parts.next().unwrap_or_default().to_string();
            match parts.next() {
                Some(idx) => {
                    let idx: usize = idx.parse().map_err(|_| VocabularyError::Parse {
                        line: n + 1,
                        reason: format!("invalid token index {idx:?}"),
                    })?;
                    if parts.next().is_some() {
                        return Err(VocabularyError::Parse {
                            line: n + 1,
                            reason: "expected `symbol` or `symbol index`".to_string(),
                        });
                    }
                    indexed.push((symbol, idx, n + 1));
                }
                None => sequential.push(symbol),
            }
        }

        if !indexed.is_empty() && !sequential.is_empty() {
            return Err(VocabularyError::Parse {
                line: 0,
                reason: "token file mixes indexed and bare symbols".to_string(),
            });
        }
        if indexed.is_empty() {
            return Ok(sequential);
        }

        let count = indexed.len();
        let mut slots: Vec<Option<String>> = vec![None; count];
        for (symbol, idx, line) in indexed {
            let Some(slot) = slots.get_mut(idx) else {
                return Err(VocabularyError::Parse {
                    line,
                    reason: format!("token index {idx} out of range for {count} indexed tokens"),
                });
            };
            if slot.is_some() {
                return Err(VocabularyError::Parse {
                    line,
                    reason: format!("token index {idx} assigned twice"),
                });
            }
            *slot = Some(symbol);
        }
        // Indices are unique and below `count`, so every slot is filled.
        Ok(slots.into_iter().flatten().collect())
    }

    fn build_index(symbols: &[String]) -> Result<HashMap<String, usize>, VocabularyError> {
        if symbols.is_empty() {
            return Err(VocabularyError::Empty);
        }
        let mut index = HashMap::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            if let Some(first) = index.insert(symbol.clone(), i) {
                return Err(VocabularyError::DuplicateSymbol {
                    symbol: symbol.clone(),
                    first,
                    second: i,
                });
            }
        }
        Ok(index)
    }

    fn assemble(
        symbols: Vec<String>,
        index: HashMap<String, usize>,
        blank: usize,
        separator: usize,
    ) -> Result<Self, VocabularyError> {
        if blank == separator {
            return Err(VocabularyError::BlankIsSeparator(blank));
        }
        Ok(Self {
            symbols,
            index,
            blank,
            separator,
        })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn blank(&self) -> usize {
        self.blank
    }

    pub fn separator(&self) -> usize {
        self.separator
    }

    pub fn symbol(&self, idx: usize) -> Option<&str> {
        self.symbols.get(idx).map(String::as_str)
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }
}
