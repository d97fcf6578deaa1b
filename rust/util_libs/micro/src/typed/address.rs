use std::collections::HashMap;
use std::marker::PhantomData;
use thiserror::Error;

pub const MATCH_ONE: &str = "*";
pub const MATCH_ALL: &str = ">";
pub const SEPARATOR: char = '.';

#[derive(Debug, Error, PartialEq)]
pub enum AddressError {
    #[error("placeholder cannot be empty in '{0}'")]
    EmptyPlaceholder(String),

    #[error("placeholder '{0}' must occupy a whole token")]
    PartialToken(String),

    #[error("only one '{{name...}}' wildcard is allowed in '{0}'")]
    MultipleWildcards(String),

    #[error("the '{0}' wildcard must be the last token")]
    WildcardNotTerminal(String),

    #[error("missing parameter '{0}' in template")]
    MissingParameter(String),

    #[error("unknown parameter '{0}' in template")]
    UnknownParameter(String),

    #[error("subject '{subject}' does not match template '{template}'")]
    SubjectMismatch { subject: String, template: String },

    #[error("missing value for parameter '{0}'")]
    MissingValue(String),

    #[error("parameter '{0}' expects a single token")]
    ExpectedToken(String),

    #[error("parameter '{0}' expects at least one trailing token")]
    ExpectedTokens(String),
}

/// A value extracted from, or substituted into, a subject template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamValue {
    /// Matches exactly one token.
    Token(String),
    /// Matches the remaining tokens (terminal wildcard).
    Rest(Vec<String>),
}

/// The parameter set of an address template.
///
/// Every placeholder of the template must be covered by a field and vice
/// versa; the unit type serves templates without placeholders.
pub trait Parameters: Clone + Send + Sync + Sized {
    fn fields() -> &'static [&'static str];
    fn get(&self, field: &str) -> Option<ParamValue>;
    fn from_values(values: HashMap<String, ParamValue>) -> Result<Self, AddressError>;
}

impl Parameters for () {
    fn fields() -> &'static [&'static str] {
        &[]
    }

    fn get(&self, _field: &str) -> Option<ParamValue> {
        None
    }

    fn from_values(_values: HashMap<String, ParamValue>) -> Result<Self, AddressError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

/// A subject template with placeholders.
///
/// `{name}` matches a single token; a terminal `{name...}` matches the
/// rest of the subject. An address is generic over the parameter set the
/// placeholders bind to:
///
/// ```ignore
/// let address: Address<DeviceParams> = Address::new("foo.{device_id}")?;
/// address.subject_for(&DeviceParams { device_id: "123".into() })?; // "foo.123"
/// address.parse_subject("foo.123")?; // DeviceParams { device_id: "123" }
/// ```
#[derive(Clone, Debug)]
pub struct Address<P> {
    template: String,
    filter: String,
    segments: Vec<Segment>,
    _params: PhantomData<fn() -> P>,
}

impl<P> Address<P> {
    /// The raw template string.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The NATS subject filter, with placeholders as `*` / `>`.
    pub fn subject_filter(&self) -> &str {
        &self.filter
    }
}

impl<P: Parameters> Address<P> {
    pub fn new(template: &str) -> Result<Self, AddressError> {
        let mut segments = Vec::new();
        let mut wildcard: Option<String> = None;
        let tokens: Vec<&str> = template.split(SEPARATOR).collect();
        let last = tokens.len() - 1;
        for (position, token) in tokens.iter().enumerate() {
            if let Some(inner) = token.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
                if let Some(name) = inner.strip_suffix("...") {
                    if wildcard.is_some() {
                        return Err(AddressError::MultipleWildcards(template.to_string()));
                    }
                    if position != last {
                        return Err(AddressError::WildcardNotTerminal(name.to_string()));
                    }
                    if name.is_empty() {
                        return Err(AddressError::EmptyPlaceholder(template.to_string()));
                    }
                    wildcard = Some(name.to_string());
                    segments.push(Segment::Wildcard(name.to_string()));
                } else {
                    if inner.is_empty() {
                        return Err(AddressError::EmptyPlaceholder(template.to_string()));
                    }
                    segments.push(Segment::Param(inner.to_string()));
                }
            } else if token.contains('{') || token.contains('}') {
                return Err(AddressError::PartialToken(token.to_string()));
            } else {
                segments.push(Segment::Literal(token.to_string()));
            }
        }

        let address = Self {
            template: template.to_string(),
            filter: segments
                .iter()
                .map(|segment| match segment {
                    Segment::Literal(literal) => literal.as_str(),
                    Segment::Param(_) => MATCH_ONE,
                    Segment::Wildcard(_) => MATCH_ALL,
                })
                .collect::<Vec<_>>()
                .join("."),
            segments,
            _params: PhantomData,
        };
        address.verify()?;
        Ok(address)
    }

    /// Check that placeholders and parameter fields cover each other.
    fn verify(&self) -> Result<(), AddressError> {
        let placeholders: Vec<&str> = self
            .segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) | Segment::Wildcard(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect();
        for field in P::fields() {
            if !placeholders.contains(field) {
                return Err(AddressError::MissingParameter(field.to_string()));
            }
        }
        for placeholder in placeholders {
            if !P::fields().contains(&placeholder) {
                return Err(AddressError::UnknownParameter(placeholder.to_string()));
            }
        }
        Ok(())
    }

    /// Render a concrete subject for a parameter value.
    pub fn subject_for(&self, params: &P) -> Result<String, AddressError> {
        let mut tokens: Vec<String> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => tokens.push(literal.clone()),
                Segment::Param(name) => match params.get(name) {
                    Some(ParamValue::Token(token)) => tokens.push(token),
                    Some(ParamValue::Rest(_)) => {
                        return Err(AddressError::ExpectedToken(name.clone()))
                    }
                    None => return Err(AddressError::MissingValue(name.clone())),
                },
                Segment::Wildcard(name) => match params.get(name) {
                    Some(ParamValue::Rest(rest)) => {
                        if rest.is_empty() {
                            return Err(AddressError::ExpectedTokens(name.clone()));
                        }
                        tokens.extend(rest);
                    }
                    Some(ParamValue::Token(token)) => tokens.push(token),
                    None => return Err(AddressError::MissingValue(name.clone())),
                },
            }
        }
        Ok(tokens.join("."))
    }

    /// Extract the parameter value from a concrete subject.
    pub fn parse_subject(&self, subject: &str) -> Result<P, AddressError> {
        let tokens: Vec<&str> = subject.split(SEPARATOR).collect();
        let has_wildcard = matches!(self.segments.last(), Some(Segment::Wildcard(_)));
        let matches_length = if has_wildcard {
            tokens.len() >= self.segments.len()
        } else {
            tokens.len() == self.segments.len()
        };
        if !matches_length {
            return Err(AddressError::SubjectMismatch {
                subject: subject.to_string(),
                template: self.template.clone(),
            });
        }

        let mut values = HashMap::new();
        for (position, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => {
                    if tokens[position] != literal {
                        return Err(AddressError::SubjectMismatch {
                            subject: subject.to_string(),
                            template: self.template.clone(),
                        });
                    }
                }
                Segment::Param(name) => {
                    values.insert(name.clone(), ParamValue::Token(tokens[position].to_string()));
                }
                Segment::Wildcard(name) => {
                    let rest: Vec<String> =
                        tokens[position..].iter().map(|t| t.to_string()).collect();
                    values.insert(name.clone(), ParamValue::Rest(rest));
                }
            }
        }
        P::from_values(values)
    }
}
