use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::ffprobe::ProbeMap;

/// Separator between show name and the season/episode marker
pub const USCORE_SEP: &str = "_";
/// Separator between the episode marker and the episode title
pub const WIDE_DASH_SEP: &str = "\u{2015}";

/// Multi-track rip dumps are named `<title>_t00.mkv`, `<title>_t01.mkv`, ...
const TRACK_MARKER: &str = "_t";

/// Words that disc rips tend to carry in show folder names
const SHOW_NOISE_WORDS: &[&str] = &["disc", "season"];

/// Physical origin of the rip; selects the encode preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscFormat {
    Dvd,
    BluRay,
}

impl fmt::Display for DiscFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscFormat::Dvd => write!(f, "DVD"),
            DiscFormat::BluRay => write!(f, "Blu-Ray"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    Movie,
    Show,
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaCategory::Movie => write!(f, "Movie"),
            MediaCategory::Show => write!(f, "Show"),
        }
    }
}

/// Format-level fields copied out of the ffprobe report
///
/// Durations stay as the raw sexagesimal string until asked for through
/// [`MediaRecord::duration`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TechnicalInfo {
    pub duration: Option<String>,
    pub start_time: Option<String>,
    pub bit_rate: Option<u64>,
    pub size: Option<u64>,
    pub format_name: Option<String>,
    pub format_long_name: Option<String>,
    pub nb_streams: Option<u32>,
    pub nb_programs: Option<u32>,
    pub probe_score: Option<u32>,
    pub encoder: Option<String>,
    pub creation_time: Option<String>,
}

/// Naming fields that only TV shows carry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShowInfo {
    pub show_title: String,
    pub season: u32,
    /// `None` until probing or enrichment supplies it; `0` marks a special
    pub episode_number: Option<u32>,
    pub episode_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MediaKind {
    Movie,
    Show(ShowInfo),
}

/// One ripped file waiting to be transcoded
///
/// Two records are equal when they point at the same file. Technical fields
/// are fixed once probing has populated them; only the naming fields change
/// afterwards, through [`MediaRecord::set_title`] and
/// [`MediaRecord::set_episode`].
#[derive(Debug, Clone, Serialize)]
pub struct MediaRecord {
    filename: PathBuf,
    source_title: String,
    year: Option<u16>,
    disc_format: DiscFormat,
    technical: TechnicalInfo,
    kind: MediaKind,
}

impl MediaRecord {
    pub fn new(
        filename: impl Into<PathBuf>,
        disc_format: DiscFormat,
        category: MediaCategory,
    ) -> Result<Self> {
        let filename = filename.into();
        if filename.as_os_str().is_empty() {
            return Err(Error::format("filename", "", "media record needs a file path"));
        }

        let kind = match category {
            MediaCategory::Movie => MediaKind::Movie,
            MediaCategory::Show => MediaKind::Show(ShowInfo::default()),
        };

        Ok(Self {
            filename,
            source_title: String::new(),
            year: None,
            disc_format,
            technical: TechnicalInfo::default(),
            kind,
        })
    }

    /// Build a record from a flattened probe report
    ///
    /// Only keys on the variant's allow-list are read; everything else is
    /// ignored so newer ffprobe releases can add fields freely. A listed
    /// field holding a value of the wrong shape is logged and left unset.
    pub fn from_probe(
        filename: impl Into<PathBuf>,
        disc_format: DiscFormat,
        category: MediaCategory,
        probe: &ProbeMap,
    ) -> Result<Self> {
        let mut record = Self::new(filename, disc_format, category)?;
        record.apply_probe(probe);
        Ok(record)
    }

    fn apply_probe(&mut self, probe: &ProbeMap) {
        let has_show_tag = probe.keys().any(|k| k.eq_ignore_ascii_case("show"));

        for (key, value) in probe {
            let field = key.to_ascii_lowercase();
            let Some(text) = probe_text(value) else {
                continue;
            };

            match field.as_str() {
                "duration" => self.technical.duration = Some(text),
                "start_time" => self.technical.start_time = Some(text),
                "bit_rate" => self.technical.bit_rate = self.lenient_number(&field, &text),
                "size" => self.technical.size = self.lenient_number(&field, &text),
                "format_name" => self.technical.format_name = Some(text),
                "format_long_name" => self.technical.format_long_name = Some(text),
                "nb_streams" => self.technical.nb_streams = self.lenient_number(&field, &text),
                "nb_programs" => self.technical.nb_programs = self.lenient_number(&field, &text),
                "probe_score" => self.technical.probe_score = self.lenient_number(&field, &text),
                "encoder" => self.technical.encoder = Some(text),
                "creation_time" => self.technical.creation_time = Some(text),
                "year" | "date" => match parse_year(&field, &text) {
                    Ok(year) => self.year = Some(year),
                    Err(e) => warn!("Ignoring {} for {}: {}", field, self.filename.display(), e),
                },
                // With a separate show tag the title tag names the episode
                "title" if has_show_tag && self.is_show() => {
                    if let MediaKind::Show(info) = &mut self.kind {
                        info.episode_title = Some(text);
                    }
                }
                "title" => self.set_title(&text),
                "show" if self.is_show() => self.set_title(&text),
                "season_number" | "episode_sort" if self.is_show() => {
                    let number = self.lenient_number(&field, &text);
                    if let MediaKind::Show(info) = &mut self.kind {
                        if field == "season_number" {
                            info.season = number.unwrap_or_default();
                        } else {
                            info.episode_number = number;
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Numeric probe value, or `None` with a warning when it does not parse
    fn lenient_number<T: FromStr>(&self, field: &str, text: &str) -> Option<T>
    where
        T::Err: fmt::Display,
    {
        match parse_number(field, text) {
            Ok(number) => Some(number),
            Err(e) => {
                warn!("Ignoring {} for {}: {}", field, self.filename.display(), e);
                None
            }
        }
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn disc_format(&self) -> DiscFormat {
        self.disc_format
    }

    pub fn category(&self) -> MediaCategory {
        match self.kind {
            MediaKind::Movie => MediaCategory::Movie,
            MediaKind::Show(_) => MediaCategory::Show,
        }
    }

    pub fn is_show(&self) -> bool {
        matches!(self.kind, MediaKind::Show(_))
    }

    pub fn technical(&self) -> &TechnicalInfo {
        &self.technical
    }

    pub fn year(&self) -> Option<u16> {
        self.year
    }

    /// Explicit title as supplied by probe tags or enrichment, possibly empty
    pub fn source_title(&self) -> &str {
        &self.source_title
    }

    /// Final path segment cut at the first `_t`, or the file stem when the
    /// name carries no track marker
    pub fn basename(&self) -> String {
        let name = self
            .filename
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match name.find(TRACK_MARKER) {
            Some(idx) => name[..idx].to_string(),
            None => self
                .filename
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or(name),
        }
    }

    /// Display title: the explicit title when set, otherwise one derived
    /// from the basename
    pub fn title(&self) -> String {
        match &self.kind {
            MediaKind::Show(info) if !info.show_title.is_empty() => info.show_title.clone(),
            MediaKind::Show(_) => normalize_show_title(&self.basename()),
            MediaKind::Movie if !self.source_title.is_empty() => self.source_title.clone(),
            MediaKind::Movie => title_case(&self.basename().replace('_', " ")),
        }
    }

    /// Set the title; shows get their disc/season noise stripped
    pub fn set_title(&mut self, raw: &str) {
        self.source_title = raw.trim().to_string();
        if let MediaKind::Show(info) = &mut self.kind {
            info.show_title = normalize_show_title(raw);
        }
    }

    /// Record season/episode naming for a show; no-op for movies
    pub fn set_episode(&mut self, season: u32, episode_number: u32, episode_title: Option<String>) {
        if let MediaKind::Show(info) = &mut self.kind {
            info.season = season;
            info.episode_number = Some(episode_number);
            info.episode_title = episode_title;
        }
    }

    /// Stem used for the transcoded file
    pub fn output_stem(&self) -> String {
        match &self.kind {
            MediaKind::Show(ShowInfo {
                season,
                episode_number: Some(episode),
                episode_title,
                ..
            }) => compose_episode_tag(&self.title(), *season, *episode, episode_title.as_deref()),
            _ => self.title(),
        }
    }

    pub fn duration(&self) -> Result<Duration> {
        match &self.technical.duration {
            Some(raw) => parse_timestamp(raw),
            None => Err(Error::format("duration", "", "file was not probed for a duration")),
        }
    }

    /// Length in whole minutes, rounded to nearest
    pub fn duration_minutes(&self) -> Result<u64> {
        let duration = self.duration()?;
        Ok((duration.as_secs_f64() / 60.0).round() as u64)
    }
}

impl PartialEq for MediaRecord {
    fn eq(&self, other: &Self) -> bool {
        self.filename == other.filename
    }
}

impl Eq for MediaRecord {}

impl Hash for MediaRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.filename.hash(state);
    }
}

impl fmt::Display for MediaRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}", self.category(), self.title())?;
        if let Some(year) = self.year {
            write!(f, " ({})", year)?;
        }
        Ok(())
    }
}

/// Canonical episode tag, e.g. `The Simpsons_s01e01―Bart the Genius`
pub fn compose_episode_tag(
    show_name: &str,
    season: u32,
    episode_number: u32,
    episode_title: Option<&str>,
) -> String {
    let tag = format!(
        "{}{}s{:02}e{:02}",
        show_name, USCORE_SEP, season, episode_number
    );

    match episode_title {
        Some(title) if !title.is_empty() => format!("{}{}{}", tag, WIDE_DASH_SEP, title),
        _ => tag,
    }
}

/// Strip disc/season noise words and non-alphanumeric tokens, then title-case
pub fn normalize_show_title(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '_')
        .filter(|token| !token.is_empty())
        .filter(|token| !is_show_noise(token))
        .filter(|token| token.chars().all(char::is_alphanumeric))
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_show_noise(token: &str) -> bool {
    let lower = token.to_lowercase();
    SHOW_NOISE_WORDS.iter().any(|word| {
        lower
            .strip_prefix(word)
            .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
    })
}

/// Capitalize the first letter of every word, lowercase the rest
///
/// Apostrophes do not start a new word, so `don't` stays `Don't`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word_start = true;

    for ch in text.split_whitespace().collect::<Vec<_>>().join(" ").chars() {
        if ch.is_alphanumeric() {
            if word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(ch);
            word_start = ch != '\'';
        }
    }

    out
}

/// Parse `H:MM:SS[.fraction]` as printed by `ffprobe -sexagesimal`
pub fn parse_timestamp(text: &str) -> Result<Duration> {
    let invalid = |why: &str| Error::format("duration", text, why);

    let parts: Vec<&str> = text.trim().split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return Err(invalid("expected HH:MM:SS[.fraction]"));
    };

    let (whole, fraction) = match seconds.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (*seconds, None),
    };

    if !is_digits(hours) || minutes.len() != 2 || !is_digits(minutes) {
        return Err(invalid("expected HH:MM:SS[.fraction]"));
    }
    if whole.len() != 2 || !is_digits(whole) {
        return Err(invalid("expected two-digit seconds"));
    }
    if let Some(fraction) = fraction {
        if !is_digits(fraction) {
            return Err(invalid("fraction must be digits"));
        }
    }

    let hours: u64 = hours.parse().map_err(|_| invalid("hours out of range"))?;
    let minutes: u64 = minutes.parse().map_err(|_| invalid("bad minutes"))?;
    let whole: u64 = whole.parse().map_err(|_| invalid("bad seconds"))?;
    if minutes >= 60 || whole >= 60 {
        return Err(invalid("minutes and seconds must be below 60"));
    }

    let nanos = match fraction {
        Some(fraction) => {
            let mut digits: String = fraction.chars().take(9).collect();
            while digits.len() < 9 {
                digits.push('0');
            }
            digits.parse().map_err(|_| invalid("bad fraction"))?
        }
        None => 0,
    };

    let total = hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60 + whole))
        .ok_or_else(|| invalid("hours out of range"))?;

    Ok(Duration::new(total, nanos))
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

/// Scalar probe values as text; ffprobe's `N/A` and nested values are skipped
fn probe_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };

    if text.is_empty() || text == "N/A" {
        None
    } else {
        Some(text)
    }
}

fn parse_number<T: FromStr>(field: &str, text: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    text.parse::<T>()
        .map_err(|e| Error::format(field, text, e.to_string()))
}

fn parse_year(field: &str, text: &str) -> Result<u16> {
    let digits: String = text.chars().take(4).collect();
    if digits.len() != 4 || !is_digits(&digits) {
        return Err(Error::format(field, text, "expected a four-digit year"));
    }
    parse_number(field, &digits)
}
