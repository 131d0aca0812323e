use crate::error::{ConfigurationError, FvResult, SchemeCategory};
use crate::schemes::SchemeContext;
use log::debug;
use nalgebra::Scalar;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A stream of whitespace-separated words describing a scheme, e.g. `Gauss limitedLinear 1`.
///
/// The first word names the scheme; constructors read their parameters, including nested
/// schemes, from the words that follow.
#[derive(Debug, Clone)]
pub struct SchemeTokens<'a> {
    words: Vec<&'a str>,
    position: usize,
}

impl<'a> SchemeTokens<'a> {
    pub fn new(specification: &'a str) -> Self {
        Self {
            words: specification.split_whitespace().collect(),
            position: 0,
        }
    }

    pub fn peek(&self) -> Option<&'a str> {
        self.words.get(self.position).copied()
    }

    pub fn next_word(&mut self) -> Option<&'a str> {
        let word = self.peek();
        if word.is_some() {
            self.position += 1;
        }
        word
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.words.len()
    }

    /// The words that have not been consumed yet.
    pub fn remaining(&self) -> &[&'a str] {
        &self.words[self.position.min(self.words.len())..]
    }

    /// Read and parse the next word as a parameter of `scheme`.
    pub fn read<P: FromStr>(&mut self, category: SchemeCategory, scheme: &str, parameter: &str) -> FvResult<P> {
        let word = self.next_word().ok_or_else(|| ConfigurationError::InvalidSchemeParameter {
            category,
            scheme: scheme.to_string(),
            message: format!("missing {}", parameter),
        })?;
        word.parse().map_err(|_| {
            ConfigurationError::InvalidSchemeParameter {
                category,
                scheme: scheme.to_string(),
                message: format!("cannot parse {} from \"{}\"", parameter, word),
            }
            .into()
        })
    }

    /// Whether the next word parses as a number.
    pub fn next_is_number(&self) -> bool {
        self.peek().map_or(false, |word| word.parse::<f64>().is_ok())
    }

    /// Fails if any words are left unconsumed.
    pub fn expect_end(&self, category: SchemeCategory, scheme: &str) -> FvResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidSchemeParameter {
                category,
                scheme: scheme.to_string(),
                message: format!("unexpected trailing input \"{}\"", self.remaining().join(" ")),
            }
            .into())
        }
    }
}

/// Names of the schemes of one category, mapped to their constructors.
///
/// `S` is the (unsized) trait object type produced by the constructors, for example
/// `dyn ConvectionScheme<T, V>`.
pub struct SchemeRegistry<T: Scalar, S: ?Sized> {
    category: SchemeCategory,
    constructors: BTreeMap<String, fn(&SchemeContext<'_, T>, &mut SchemeTokens<'_>) -> FvResult<Box<S>>>,
    aliases: BTreeMap<String, String>,
}

impl<T: Scalar, S: ?Sized> SchemeRegistry<T, S> {
    pub fn new(category: SchemeCategory) -> Self {
        Self {
            category,
            constructors: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    pub fn category(&self) -> SchemeCategory {
        self.category
    }

    /// Register a constructor under a new name.
    ///
    /// Fails with [`ConfigurationError::DuplicateScheme`] if the name is already used by a
    /// scheme or an alias.
    pub fn register(
        &mut self,
        name: &str,
        constructor: fn(&SchemeContext<'_, T>, &mut SchemeTokens<'_>) -> FvResult<Box<S>>,
    ) -> FvResult<()> {
        self.check_unused(name)?;
        self.constructors.insert(name.to_string(), constructor);
        Ok(())
    }

    /// Register a deprecated alias for an existing scheme.
    pub fn register_alias(&mut self, alias: &str, canonical: &str) -> FvResult<()> {
        self.check_unused(alias)?;
        if !self.constructors.contains_key(canonical) {
            return Err(self.unknown(canonical));
        }
        self.aliases.insert(alias.to_string(), canonical.to_string());
        Ok(())
    }

    fn check_unused(&self, name: &str) -> FvResult<()> {
        if self.constructors.contains_key(name) || self.aliases.contains_key(name) {
            Err(ConfigurationError::DuplicateScheme {
                category: self.category,
                name: name.to_string(),
            }
            .into())
        } else {
            Ok(())
        }
    }

    /// Registered scheme names in alphabetical order, without aliases.
    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name) || self.aliases.contains_key(name)
    }

    fn unknown(&self, name: &str) -> crate::error::FvError {
        ConfigurationError::UnknownScheme {
            category: self.category,
            name: name.to_string(),
            valid: self.names(),
        }
        .into()
    }

    /// Construct the scheme named by the next word of `tokens`.
    pub fn construct(&self, context: &SchemeContext<'_, T>, tokens: &mut SchemeTokens<'_>) -> FvResult<Box<S>> {
        let name = tokens
            .next_word()
            .ok_or_else(|| ConfigurationError::MissingSchemeName {
                category: self.category,
                valid: self.names(),
            })?;
        let canonical = match self.aliases.get(name) {
            Some(canonical) => {
                debug!("{} scheme \"{}\" is deprecated, using \"{}\"", self.category, name, canonical);
                canonical.as_str()
            }
            None => name,
        };
        let constructor = self.constructors.get(canonical).ok_or_else(|| self.unknown(name))?;
        debug!("Constructing {} scheme \"{}\"", self.category, canonical);
        constructor(context, tokens)
    }
}

impl<T: Scalar, S: ?Sized> Clone for SchemeRegistry<T, S> {
    fn clone(&self) -> Self {
        Self {
            category: self.category,
            constructors: self.constructors.clone(),
            aliases: self.aliases.clone(),
        }
    }
}

impl<T: Scalar, S: ?Sized> fmt::Debug for SchemeRegistry<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemeRegistry")
            .field("category", &self.category)
            .field("names", &self.names())
            .field("aliases", &self.aliases)
            .finish()
    }
}
