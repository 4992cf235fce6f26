use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An independently published table the pipeline consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Net,
    Bpi,
    KenPom,
    Ap,
    Sos,
    Records,
    Espn,
}

impl Source {
    pub const ALL: [Source; 7] = [
        Source::Net,
        Source::Bpi,
        Source::KenPom,
        Source::Ap,
        Source::Sos,
        Source::Records,
        Source::Espn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Net => "net",
            Source::Bpi => "bpi",
            Source::KenPom => "kenpom",
            Source::Ap => "ap",
            Source::Sos => "sos",
            Source::Records => "records",
            Source::Espn => "espn",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        let source = match key.as_str() {
            "net" => Source::Net,
            "bpi" => Source::Bpi,
            "kenpom" | "ken_pom" => Source::KenPom,
            "ap" | "ap_poll" => Source::Ap,
            "sos" => Source::Sos,
            "records" | "record" => Source::Records,
            "espn" | "game_log" | "games" => Source::Espn,
            _ => return Err(format!("unknown source id: {}", s.trim())),
        };
        Ok(source)
    }
}

/// A rank-valued metric. Lower is better for every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Net,
    Bpi,
    KenPom,
    Ap,
    Sos,
}

impl Metric {
    /// Output column order.
    pub const ALL: [Metric; 5] = [Metric::Ap, Metric::Net, Metric::KenPom, Metric::Bpi, Metric::Sos];

    /// Metrics averaged into the composite rank unless configured otherwise.
    pub const DEFAULT_COMPOSITE: [Metric; 3] = [Metric::Net, Metric::KenPom, Metric::Bpi];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Net => "net",
            Metric::Bpi => "bpi",
            Metric::KenPom => "kenpom",
            Metric::Ap => "ap",
            Metric::Sos => "sos",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Metric::Net => "net_rank",
            Metric::Bpi => "bpi_rank",
            Metric::KenPom => "kenpom_rank",
            Metric::Ap => "ap_rank",
            Metric::Sos => "sos_rank",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        let key = key.strip_suffix("_rank").unwrap_or(&key);
        let metric = match key {
            "net" => Metric::Net,
            "bpi" => Metric::Bpi,
            "kenpom" | "ken_pom" => Metric::KenPom,
            "ap" => Metric::Ap,
            "sos" => Metric::Sos,
            _ => return Err(format!("unknown metric: {}", s.trim())),
        };
        Ok(metric)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WinLoss {
    pub wins: u32,
    pub losses: u32,
}

impl WinLoss {
    /// Parses the first `W-L` pair found in `raw`, e.g. `"15-3"` or `"15 - 3 (8-2)"`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (left, right) = raw.split_once('-')?;
        let wins = left
            .trim_end()
            .rsplit(|c: char| !c.is_ascii_digit())
            .next()?;
        let losses = right
            .trim_start()
            .split(|c: char| !c.is_ascii_digit())
            .next()?;
        Some(Self {
            wins: wins.parse().ok()?,
            losses: losses.parse().ok()?,
        })
    }
}

impl fmt::Display for WinLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.wins, self.losses)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricValue {
    Rank(Metric, u32),
    Record(WinLoss),
}

impl MetricValue {
    pub fn column(&self) -> &'static str {
        match self {
            MetricValue::Rank(metric, _) => metric.column(),
            MetricValue::Record(_) => "record",
        }
    }
}

/// One value for one team as published by one source, before name resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
    pub source: Source,
    pub raw_team: String,
    pub value: MetricValue,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Location {
    Home,
    Away,
    Neutral,
}

impl Location {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "home" | "h" | "vs" | "vs." => Some(Location::Home),
            "away" | "a" | "@" | "at" => Some(Location::Away),
            "neutral" | "n" | "neutral site" => Some(Location::Neutral),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Location::Home => "Home",
            Location::Away => "Away",
            Location::Neutral => "Neutral",
        }
    }
}

/// A college season, identified by the calendar year it ends in (2024-25 is `2025`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub end_year: i32,
}

impl Season {
    pub fn new(end_year: i32) -> Self {
        Self { end_year }
    }

    /// The season a date falls in; July onwards belongs to the next season.
    pub fn containing(date: NaiveDate) -> Self {
        use chrono::Datelike;
        if date.month() >= 7 {
            Self::new(date.year() + 1)
        } else {
            Self::new(date.year())
        }
    }

    /// Places a year-less `M/D` date inside this season.
    pub fn date_for(self, month: u32, day: u32) -> Option<NaiveDate> {
        let year = if month >= 7 {
            self.end_year - 1
        } else {
            self.end_year
        };
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

/// One team's perspective of one completed game, with raw ESPN-side names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRow {
    pub date: NaiveDate,
    pub team: String,
    pub opponent: String,
    pub location: Option<Location>,
    pub team_score: u32,
    pub opponent_score: u32,
    pub win: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn win_loss_parses_common_shapes() {
        assert_eq!(WinLoss::parse("15-3"), Some(WinLoss { wins: 15, losses: 3 }));
        assert_eq!(WinLoss::parse(" 7 - 12 "), Some(WinLoss { wins: 7, losses: 12 }));
        assert_eq!(WinLoss::parse("(20-1)"), Some(WinLoss { wins: 20, losses: 1 }));
        assert_eq!(WinLoss::parse("n/a"), None);
        assert_eq!(WinLoss::parse("-"), None);
    }

    #[test]
    fn metric_accepts_column_names() {
        assert_eq!("kenpom_rank".parse::<Metric>(), Ok(Metric::KenPom));
        assert_eq!(" NET ".parse::<Metric>(), Ok(Metric::Net));
        assert!("elo".parse::<Metric>().is_err());
    }

    #[test]
    fn season_places_month_day_across_new_year() {
        let season = Season::new(2025);
        assert_eq!(season.date_for(11, 4), NaiveDate::from_ymd_opt(2024, 11, 4));
        assert_eq!(season.date_for(3, 21), NaiveDate::from_ymd_opt(2025, 3, 21));
        assert_eq!(season.date_for(2, 30), None);
        let dec = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        assert_eq!(Season::containing(dec), season);
    }

    #[test]
    fn source_ids_round_trip_through_display() {
        for source in Source::ALL {
            assert_eq!(source.to_string().parse::<Source>(), Ok(source));
        }
    }
}
