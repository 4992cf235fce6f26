use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::model::Source;

/// Stable identifier for one real-world team.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalTeam(String);

impl CanonicalTeam {
    pub fn new(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self(name.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalTeam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub source: Source,
    pub raw_name: String,
    pub canonical: CanonicalTeam,
}

impl AliasEntry {
    pub fn new(source: Source, raw_name: impl Into<String>, canonical: impl Into<String>) -> Self {
        Self {
            source,
            raw_name: raw_name.into(),
            canonical: CanonicalTeam::new(canonical),
        }
    }
}

#[derive(Error, Debug)]
pub enum AliasError {
    #[error(
        "ambiguous alias for {source_id} name {raw_name:?}: maps to both {existing:?} and {conflicting:?}"
    )]
    Ambiguous {
        source_id: Source,
        raw_name: String,
        existing: CanonicalTeam,
        conflicting: CanonicalTeam,
    },
    #[error("unknown source id {source_id:?} on alias line {line}")]
    UnknownSource { line: u64, source_id: String },
    #[error("alias file has no recognizable layout (headers: {0:?})")]
    UnrecognizedLayout(Vec<String>),
    #[error("failed to read alias file: {0}")]
    Csv(#[from] csv::Error),
}

/// Outcome of a registry lookup. Borrowed from the registry it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Matched an alias registered for the row's own source.
    Source(&'a CanonicalTeam),
    /// Matched a canonical name, or an alias through the source-independent index.
    Global(&'a CanonicalTeam),
    Unresolved,
}

impl<'a> Resolution<'a> {
    pub fn team(&self) -> Option<&'a CanonicalTeam> {
        match *self {
            Resolution::Source(team) | Resolution::Global(team) => Some(team),
            Resolution::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Resolution::Unresolved)
    }
}

#[derive(Debug, Clone)]
enum GlobalEntry {
    Team(CanonicalTeam),
    Ambiguous,
}

/// Read-only mapping from source-specific spellings to canonical teams.
///
/// Lookup order: the row's own source, then canonical names, then aliases of any source.
/// Build it once per run and pass it by reference; nothing mutates it after `build`.
#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    by_source: HashMap<Source, HashMap<String, CanonicalTeam>>,
    canonical: HashMap<String, GlobalEntry>,
    global: HashMap<String, GlobalEntry>,
    teams: BTreeSet<CanonicalTeam>,
    alias_count: usize,
}

impl AliasRegistry {
    pub fn builder() -> AliasRegistryBuilder {
        AliasRegistryBuilder::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = AliasEntry>) -> Result<Self, AliasError> {
        let mut builder = Self::builder();
        for entry in entries {
            builder.add_alias(entry)?;
        }
        Ok(builder.build())
    }

    pub fn load(path: &Path) -> Result<Self, AliasError> {
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let registry = read_alias_csv(reader)?;
        info!(
            path = %path.display(),
            teams = registry.team_count(),
            aliases = registry.alias_count(),
            "loaded alias registry"
        );
        Ok(registry)
    }

    pub fn from_reader(reader: impl io::Read) -> Result<Self, AliasError> {
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        read_alias_csv(reader)
    }

    pub fn resolve(&self, source: Source, raw_name: &str) -> Resolution<'_> {
        let key = normalize_team_name(raw_name);
        if key.is_empty() {
            return Resolution::Unresolved;
        }
        if let Some(team) = self
            .by_source
            .get(&source)
            .and_then(|names| names.get(key.as_str()))
        {
            return Resolution::Source(team);
        }
        match self
            .canonical
            .get(key.as_str())
            .or_else(|| self.global.get(key.as_str()))
        {
            Some(GlobalEntry::Team(team)) => Resolution::Global(team),
            Some(GlobalEntry::Ambiguous) | None => Resolution::Unresolved,
        }
    }

    pub fn canonical_teams(&self) -> impl Iterator<Item = &CanonicalTeam> {
        self.teams.iter()
    }

    pub fn contains_team(&self, team: &CanonicalTeam) -> bool {
        self.teams.contains(team)
    }

    pub fn team_count(&self) -> usize {
        self.teams.len()
    }

    pub fn alias_count(&self) -> usize {
        self.alias_count
    }

    /// Normalized keys that point at more than one team when the source is ignored.
    ///
    /// An alias key shadowed by a canonical name is not listed; the canonical name wins.
    pub fn ambiguous_global_keys(&self) -> Vec<&str> {
        let canonical = self
            .canonical
            .iter()
            .filter(|(_, entry)| matches!(entry, GlobalEntry::Ambiguous))
            .map(|(key, _)| key.as_str());
        let aliases = self
            .global
            .iter()
            .filter(|(key, entry)| {
                matches!(entry, GlobalEntry::Ambiguous) && !self.canonical.contains_key(*key)
            })
            .map(|(key, _)| key.as_str());
        let mut keys: Vec<&str> = canonical.chain(aliases).collect();
        keys.sort_unstable();
        keys
    }
}

#[derive(Debug, Default)]
pub struct AliasRegistryBuilder {
    by_source: HashMap<Source, HashMap<String, CanonicalTeam>>,
    teams: BTreeSet<CanonicalTeam>,
    alias_count: usize,
}

impl AliasRegistryBuilder {
    /// Registers a canonical team with no source-specific aliases.
    pub fn add_team(&mut self, team: CanonicalTeam) {
        if !team.as_str().is_empty() {
            self.teams.insert(team);
        }
    }

    pub fn add_alias(&mut self, entry: AliasEntry) -> Result<(), AliasError> {
        if entry.canonical.as_str().is_empty() {
            warn!(source = %entry.source, raw_name = %entry.raw_name, "alias without canonical team skipped");
            return Ok(());
        }
        let key = normalize_team_name(&entry.raw_name);
        if key.is_empty() {
            warn!(source = %entry.source, raw_name = %entry.raw_name, "alias normalizes to nothing, skipped");
            return Ok(());
        }

        let names = self.by_source.entry(entry.source).or_default();
        if let Some(existing) = names.get(key.as_str()) {
            if *existing != entry.canonical {
                return Err(AliasError::Ambiguous {
                    source_id: entry.source,
                    raw_name: entry.raw_name,
                    existing: existing.clone(),
                    conflicting: entry.canonical,
                });
            }
            debug!(source = %entry.source, raw_name = %entry.raw_name, "duplicate alias ignored");
            return Ok(());
        }

        names.insert(key, entry.canonical.clone());
        self.teams.insert(entry.canonical);
        self.alias_count += 1;
        Ok(())
    }

    pub fn build(self) -> AliasRegistry {
        let canonical = key_index(
            self.teams
                .iter()
                .map(|team| (normalize_team_name(team.as_str()), team)),
        );
        let global = key_index(
            self.by_source
                .values()
                .flat_map(|names| names.iter().map(|(key, team)| (key.clone(), team))),
        );
        for (key, entry) in &canonical {
            let GlobalEntry::Team(team) = entry else {
                continue;
            };
            let shadowed = match global.get(key) {
                Some(GlobalEntry::Team(other)) => other != team,
                Some(GlobalEntry::Ambiguous) => true,
                None => false,
            };
            if shadowed {
                debug!(key = %key, team = %team, "canonical name shadows an alias of another team");
            }
        }

        let registry = AliasRegistry {
            by_source: self.by_source,
            canonical,
            global,
            teams: self.teams,
            alias_count: self.alias_count,
        };
        for key in registry.ambiguous_global_keys() {
            warn!(key, "name maps to several teams across sources; global fallback disabled for it");
        }
        registry
    }
}

/// Maps each key to its team, or to `Ambiguous` once two different teams claim it.
fn key_index<'a>(
    keys: impl Iterator<Item = (String, &'a CanonicalTeam)>,
) -> HashMap<String, GlobalEntry> {
    let mut index: HashMap<String, GlobalEntry> = HashMap::new();
    for (key, team) in keys {
        if key.is_empty() {
            continue;
        }
        match index.get(&key) {
            None => {
                index.insert(key, GlobalEntry::Team(team.clone()));
            }
            Some(GlobalEntry::Team(existing)) if existing != team => {
                index.insert(key, GlobalEntry::Ambiguous);
            }
            Some(_) => {}
        }
    }
    index
}

const LONG_SOURCE_COLUMNS: &[&str] = &["source_id", "source"];
const LONG_RAW_COLUMNS: &[&str] = &["raw_name", "alias", "name"];
const CANONICAL_COLUMNS: &[&str] = &["canonical_team", "canonical", "standard_name", "team"];

fn read_alias_csv<R: io::Read>(mut reader: csv::Reader<R>) -> Result<AliasRegistry, AliasError> {
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    let find = |candidates: &[&str]| {
        candidates
            .iter()
            .find_map(|c| headers.iter().position(|h| h == c))
    };

    let canonical_col = find(CANONICAL_COLUMNS);
    let mut builder = AliasRegistry::builder();

    if let (Some(source_col), Some(raw_col), Some(canonical_col)) =
        (find(LONG_SOURCE_COLUMNS), find(LONG_RAW_COLUMNS), canonical_col)
    {
        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let source_id = record.get(source_col).unwrap_or_default();
            let raw_name = record.get(raw_col).unwrap_or_default();
            let canonical = record.get(canonical_col).unwrap_or_default();
            if raw_name.is_empty() && canonical.is_empty() {
                continue;
            }
            let source = source_id.parse::<Source>().map_err(|_| AliasError::UnknownSource {
                line,
                source_id: source_id.to_string(),
            })?;
            builder.add_alias(AliasEntry::new(source, raw_name, canonical))?;
        }
        return Ok(builder.build());
    }

    let Some(canonical_col) = canonical_col else {
        return Err(AliasError::UnrecognizedLayout(headers));
    };

    // Wide layout: one row per team, one column per source.
    let source_cols: Vec<(usize, Source)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != canonical_col)
        .filter_map(|(idx, header)| {
            let name = header.strip_suffix("_name").unwrap_or(header);
            match name.parse::<Source>() {
                Ok(source) => Some((idx, source)),
                Err(_) => {
                    debug!(column = %header, "alias column is not a source, ignored");
                    None
                }
            }
        })
        .collect();

    for record in reader.records() {
        let record = record?;
        let canonical = record.get(canonical_col).unwrap_or_default();
        if canonical.is_empty() {
            continue;
        }
        builder.add_team(CanonicalTeam::new(canonical));
        for (idx, source) in &source_cols {
            let raw_name = record.get(*idx).unwrap_or_default();
            if raw_name.is_empty() {
                continue;
            }
            builder.add_alias(AliasEntry::new(*source, raw_name, canonical))?;
        }
    }
    Ok(builder.build())
}

/// Folds a team name into the lookup key shared by alias keys and incoming names.
///
/// Drops poll/record noise (`#5`, `12 Kansas`, `(15-3)`), strips diacritics, expands a
/// leading `St.` to `saint` and a trailing one to `state`, lowercases, removes periods
/// and apostrophes, and collapses everything else to single spaces.
pub fn normalize_team_name(raw: &str) -> String {
    let repaired = raw.replace("â€™", "'");
    let trimmed = strip_record_suffix(repaired.trim());
    let folded: String = trimmed
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .replace('&', " and ");

    let mut tokens: Vec<&str> = Vec::new();
    let mut iter = folded.split_whitespace().peekable();
    while let Some(token) = iter.next() {
        if token == "#" {
            if iter.peek().is_some_and(|next| is_all_digits(next)) {
                iter.next();
            }
            continue;
        }
        if token.strip_prefix('#').is_some_and(is_all_digits) {
            continue;
        }
        tokens.push(token);
    }
    if tokens.len() > 1 && is_all_digits(tokens[0]) {
        tokens.remove(0);
    }

    let last = tokens.len().saturating_sub(1);
    let mut out = String::with_capacity(folded.len());
    for (idx, token) in tokens.iter().enumerate() {
        let is_st = token.eq_ignore_ascii_case("st") || token.eq_ignore_ascii_case("st.");
        if is_st && tokens.len() > 1 && idx == 0 {
            out.push_str("saint");
        } else if is_st && tokens.len() > 1 && idx == last {
            out.push_str("state");
        } else {
            for c in token.chars() {
                match c {
                    '.' | '\'' | '\u{2019}' | '`' => {}
                    c if c.is_alphanumeric() => out.extend(c.to_lowercase()),
                    _ => out.push(' '),
                }
            }
        }
        out.push(' ');
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_record_suffix(s: &str) -> &str {
    let Some(body) = s.strip_suffix(')') else {
        return s;
    };
    let Some(open) = body.rfind('(') else {
        return s;
    };
    let inner = &body[open + 1..];
    let Some((wins, losses)) = inner.split_once('-') else {
        return s;
    };
    if is_all_digits(wins.trim()) && is_all_digits(losses.trim()) {
        body[..open].trim_end()
    } else {
        s
    }
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
