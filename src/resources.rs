use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

use crate::error::AgentError;
use crate::proto;

/// Scalars below this magnitude are treated as exhausted and dropped.
const SCALAR_EPSILON: f64 = 1e-9;

/// The value of a single named resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    /// Closed integer ranges, kept sorted and coalesced.
    Ranges(Vec<(u64, u64)>),
    Set(BTreeSet<String>),
}

/// A bundle of named resources with component-wise addition and
/// subtraction. Parses from the `name:value;name:value` form, where a
/// value is a number, a range list `[1-100,200-300]`, or a set `{a,b}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Resources {
    items: BTreeMap<String, Value>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a resource string, e.g. `cpus:4;mem:2048`.
    pub fn parse(s: &str) -> Result<Self, AgentError> {
        s.parse()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.items.get(name)
    }

    /// The scalar value of a named resource, or 0.0 when absent or not
    /// a scalar.
    pub fn get_scalar(&self, name: &str) -> f64 {
        match self.items.get(name) {
            Some(Value::Scalar(v)) => *v,
            _ => 0.0,
        }
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.items.insert(name.to_string(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.items.iter()
    }

    pub fn from_proto(resources: &[proto::Resource]) -> Self {
        let mut items = BTreeMap::new();
        for resource in resources {
            let value = match &resource.value {
                Some(proto::resource::Value::Scalar(v)) => Value::Scalar(*v),
                Some(proto::resource::Value::Ranges(ranges)) => Value::Ranges(coalesce(
                    ranges.ranges.iter().map(|r| (r.begin, r.end)).collect(),
                )),
                Some(proto::resource::Value::Set(set)) => {
                    Value::Set(set.items.iter().cloned().collect())
                }
                None => continue,
            };
            items.insert(resource.name.clone(), value);
        }
        Self { items }
    }

    pub fn to_proto(&self) -> Vec<proto::Resource> {
        self.items
            .iter()
            .map(|(name, value)| proto::Resource {
                name: name.clone(),
                value: Some(match value {
                    Value::Scalar(v) => proto::resource::Value::Scalar(*v),
                    Value::Ranges(ranges) => {
                        proto::resource::Value::Ranges(proto::Ranges {
                            ranges: ranges
                                .iter()
                                .map(|&(begin, end)| proto::Range { begin, end })
                                .collect(),
                        })
                    }
                    Value::Set(items) => proto::resource::Value::Set(proto::StringSet {
                        items: items.iter().cloned().collect(),
                    }),
                }),
            })
            .collect()
    }
}

impl FromStr for Resources {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut items = BTreeMap::new();
        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once(':').ok_or_else(|| {
                AgentError::ResourceParse(format!("expected name:value, got '{part}'"))
            })?;
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() {
                return Err(AgentError::ResourceParse(format!(
                    "empty resource name in '{part}'"
                )));
            }
            let parsed = if let Some(inner) = value.strip_prefix('[') {
                let inner = inner.strip_suffix(']').ok_or_else(|| {
                    AgentError::ResourceParse(format!("unterminated range list in '{part}'"))
                })?;
                Value::Ranges(coalesce(parse_ranges(inner)?))
            } else if let Some(inner) = value.strip_prefix('{') {
                let inner = inner.strip_suffix('}').ok_or_else(|| {
                    AgentError::ResourceParse(format!("unterminated set in '{part}'"))
                })?;
                Value::Set(
                    inner
                        .split(',')
                        .map(str::trim)
                        .filter(|i| !i.is_empty())
                        .map(str::to_string)
                        .collect(),
                )
            } else {
                Value::Scalar(value.parse::<f64>().map_err(|_| {
                    AgentError::ResourceParse(format!("invalid scalar '{value}'"))
                })?)
            };
            items.insert(name.to_string(), parsed);
        }
        Ok(Self { items })
    }
}

fn parse_ranges(inner: &str) -> Result<Vec<(u64, u64)>, AgentError> {
    inner
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|range| {
            let (begin, end) = range.split_once('-').ok_or_else(|| {
                AgentError::ResourceParse(format!("expected begin-end, got '{range}'"))
            })?;
            let begin = begin.trim().parse::<u64>().map_err(|_| {
                AgentError::ResourceParse(format!("invalid range bound '{begin}'"))
            })?;
            let end = end.trim().parse::<u64>().map_err(|_| {
                AgentError::ResourceParse(format!("invalid range bound '{end}'"))
            })?;
            if begin > end {
                return Err(AgentError::ResourceParse(format!(
                    "range '{range}' is inverted"
                )));
            }
            Ok((begin, end))
        })
        .collect()
}

/// Sort ranges and merge overlapping or adjacent ones.
fn coalesce(mut ranges: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
    ranges.sort_unstable();
    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(ranges.len());
    for (begin, end) in ranges {
        match merged.last_mut() {
            Some(last) if begin <= last.1.saturating_add(1) => {
                last.1 = last.1.max(end);
            }
            _ => merged.push((begin, end)),
        }
    }
    merged
}

/// Remove `remove` from `from`, splitting ranges where necessary.
fn subtract_ranges(from: &[(u64, u64)], remove: &[(u64, u64)]) -> Vec<(u64, u64)> {
    let mut result = Vec::new();
    for &(begin, end) in from {
        let mut pieces = vec![(begin, end)];
        for &(rb, re) in remove {
            let mut next = Vec::new();
            for (pb, pe) in pieces {
                if re < pb || rb > pe {
                    next.push((pb, pe));
                    continue;
                }
                if rb > pb {
                    next.push((pb, rb - 1));
                }
                if re < pe {
                    next.push((re + 1, pe));
                }
            }
            pieces = next;
        }
        result.extend(pieces);
    }
    coalesce(result)
}

impl AddAssign<&Resources> for Resources {
    fn add_assign(&mut self, other: &Resources) {
        for (name, value) in &other.items {
            match (self.items.get_mut(name), value) {
                (Some(Value::Scalar(a)), Value::Scalar(b)) => *a += b,
                (Some(Value::Ranges(a)), Value::Ranges(b)) => {
                    let mut combined = a.clone();
                    combined.extend_from_slice(b);
                    *a = coalesce(combined);
                }
                (Some(Value::Set(a)), Value::Set(b)) => {
                    a.extend(b.iter().cloned());
                }
                // Mismatched kinds under the same name are left untouched.
                (Some(_), _) => {}
                (None, _) => {
                    self.items.insert(name.clone(), value.clone());
                }
            }
        }
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, other: Resources) {
        *self += &other;
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(mut self, other: Resources) -> Resources {
        self += &other;
        self
    }
}

impl SubAssign<&Resources> for Resources {
    fn sub_assign(&mut self, other: &Resources) {
        for (name, value) in &other.items {
            let exhausted = match (self.items.get_mut(name), value) {
                (Some(Value::Scalar(a)), Value::Scalar(b)) => {
                    *a -= b;
                    *a <= SCALAR_EPSILON
                }
                (Some(Value::Ranges(a)), Value::Ranges(b)) => {
                    *a = subtract_ranges(a, b);
                    a.is_empty()
                }
                (Some(Value::Set(a)), Value::Set(b)) => {
                    for item in b {
                        a.remove(item);
                    }
                    a.is_empty()
                }
                _ => false,
            };
            if exhausted {
                self.items.remove(name);
            }
        }
    }
}

impl SubAssign for Resources {
    fn sub_assign(&mut self, other: Resources) {
        *self -= &other;
    }
}

impl Sub for Resources {
    type Output = Resources;

    fn sub(mut self, other: Resources) -> Resources {
        self -= &other;
        self
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.items {
            if !first {
                write!(f, ";")?;
            }
            first = false;
            match value {
                Value::Scalar(v) => write!(f, "{name}:{v}")?,
                Value::Ranges(ranges) => {
                    write!(f, "{name}:[")?;
                    for (i, (begin, end)) in ranges.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{begin}-{end}")?;
                    }
                    write!(f, "]")?;
                }
                Value::Set(items) => {
                    write!(f, "{name}:{{")?;
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{item}")?;
                    }
                    write!(f, "}}")?;
                }
            }
        }
        Ok(())
    }
}
