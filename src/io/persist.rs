//! Feature-set persistence
//!
//! Analyzing a song costs minutes; loading its feature set back costs
//! milliseconds. A saved analysis is two files next to each other:
//!
//! - `<stem>.feat` — plain text: a `Stereo`/`Mono` flag line, then per
//!   present channel the volume, rise-plus-fall and rise-minus-fall
//!   arrays, one value per line.
//! - `<stem>.tfeat` — gzip-compressed text: the flag line again, then per
//!   channel the correlation tensor (row-major) and the peak-rate table,
//!   one value per line. Compressed because the tensor runs to millions
//!   of lines.
//!
//! Values are printed with Rust's shortest round-trip float formatting,
//! so a save/load cycle reproduces the numbers exactly. Loading validates
//! everything against the caller's expected [`FeatureLayout`]; any
//! mismatch or truncation fails the whole load — no partial feature set
//! is ever returned.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::analysis::SoundAnalysis;
use crate::error::AnalysisError;
use crate::features::{
    ChannelFeatures, CorrelationTensor, FeatureLayout, FeatureSet, PeakRateTable,
    TemporalFeatures,
};

/// Extension of the plain-text basic feature file.
pub const BASIC_EXTENSION: &str = "feat";
/// Extension of the gzip-compressed temporal feature file.
pub const TEMPORAL_EXTENSION: &str = "tfeat";

const STEREO_FLAG: &str = "Stereo";
const MONO_FLAG: &str = "Mono";

/// Save a feature set under `path` (its extension, if any, is replaced).
///
/// Writes `<path>.feat`, plus `<path>.tfeat` when the set carries
/// temporal features.
///
/// # Errors
///
/// Returns `InvalidInput` if the set's arrays disagree with its own
/// layout (or only one stereo channel has a temporal block), `Io` on any
/// write failure.
pub fn save(path: &Path, features: &FeatureSet) -> Result<(), AnalysisError> {
    validate_against_layout(features)?;

    let basic_path = path.with_extension(BASIC_EXTENSION);
    log::debug!("saving basic features to {}", basic_path.display());
    let mut writer = BufWriter::new(File::create(&basic_path)?);
    write_flag(&mut writer, features.is_stereo())?;
    write_basic_channel(&mut writer, &features.left)?;
    if let Some(right) = &features.right {
        write_basic_channel(&mut writer, right)?;
    }
    writer.flush()?;

    if features.left.temporal.is_some() {
        let temporal_path = path.with_extension(TEMPORAL_EXTENSION);
        log::debug!("saving temporal features to {}", temporal_path.display());
        let encoder = GzEncoder::new(BufWriter::new(File::create(&temporal_path)?), Compression::default());
        let mut writer = BufWriter::new(encoder);
        write_flag(&mut writer, features.is_stereo())?;
        write_temporal_channel(&mut writer, &features.left)?;
        if let Some(right) = &features.right {
            write_temporal_channel(&mut writer, right)?;
        }
        let encoder = writer.into_inner().map_err(|e| e.into_error())?;
        encoder.finish()?.flush()?;
    }

    Ok(())
}

/// Load a feature set saved by [`save`].
///
/// The basic file is required; the temporal file is attached when
/// present. Everything is validated against `layout`.
///
/// # Errors
///
/// Returns `Io` if a file cannot be opened or read and `Malformed` for a
/// bad flag, an unparsable value, truncation, trailing data, or a channel
/// flag that disagrees between the two files. On any error no feature set
/// is returned.
pub fn load(path: &Path, layout: &FeatureLayout) -> Result<FeatureSet, AnalysisError> {
    let basic_path = path.with_extension(BASIC_EXTENSION);
    log::debug!("loading basic features from {}", basic_path.display());
    let mut reader = ValueReader::new(BufReader::new(File::open(&basic_path)?), &basic_path);
    let stereo = reader.read_flag()?;
    let mut left = read_basic_channel(&mut reader, layout)?;
    let mut right = if stereo {
        Some(read_basic_channel(&mut reader, layout)?)
    } else {
        None
    };
    reader.expect_end()?;

    let temporal_path = path.with_extension(TEMPORAL_EXTENSION);
    if temporal_path.exists() {
        log::debug!("loading temporal features from {}", temporal_path.display());
        let decoder = GzDecoder::new(BufReader::new(File::open(&temporal_path)?));
        let mut reader = ValueReader::new(BufReader::new(decoder), &temporal_path);
        if reader.read_flag()? != stereo {
            return Err(AnalysisError::Malformed(format!(
                "{}: channel flag disagrees with the basic feature file",
                temporal_path.display()
            )));
        }
        left.temporal = Some(read_temporal_channel(&mut reader, layout)?);
        if let Some(right) = right.as_mut() {
            right.temporal = Some(read_temporal_channel(&mut reader, layout)?);
        }
        reader.expect_end()?;
    }

    Ok(FeatureSet {
        layout: *layout,
        left,
        right,
    })
}

/// Load every saved analysis in a directory.
///
/// Picks up each `*.feat` file (with its `*.tfeat` companion when
/// present) and wraps it as a [`SoundAnalysis::Full`] named by file stem,
/// sorted by name.
///
/// # Errors
///
/// Any unreadable or mismatched entry fails the whole call.
pub fn load_library(dir: &Path, layout: &FeatureLayout) -> Result<Vec<SoundAnalysis>, AnalysisError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == BASIC_EXTENSION))
        .collect();
    paths.sort();

    log::debug!("loading {} saved analyses from {}", paths.len(), dir.display());

    let mut analyses = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
            .to_string();
        analyses.push(SoundAnalysis::Full {
            name,
            features: load(&path, layout)?,
        });
    }
    Ok(analyses)
}

fn validate_against_layout(features: &FeatureSet) -> Result<(), AnalysisError> {
    let layout = &features.layout;
    if let (Some(right), left_temporal) = (&features.right, features.left.temporal.is_some()) {
        if right.temporal.is_some() != left_temporal {
            return Err(AnalysisError::InvalidInput(
                "stereo channels must both or neither carry temporal features".to_string(),
            ));
        }
    }

    let channels = [Some(&features.left), features.right.as_ref()];
    for channel in channels.into_iter().flatten() {
        if channel.volume.len() != layout.bin_count
            || channel.rise_plus_fall.len() != layout.bin_count
            || channel.rise_minus_fall.len() != layout.bin_count
        {
            return Err(AnalysisError::InvalidInput(
                "basic feature arrays disagree with the feature layout".to_string(),
            ));
        }
        if let Some(temporal) = &channel.temporal {
            if temporal.correlation.values().len() != layout.correlation_len()
                || temporal.peak_rates.values().len() != layout.peak_rate_len()
            {
                return Err(AnalysisError::InvalidInput(
                    "temporal feature arrays disagree with the feature layout".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn write_flag<W: Write>(writer: &mut W, stereo: bool) -> Result<(), AnalysisError> {
    writeln!(writer, "{}", if stereo { STEREO_FLAG } else { MONO_FLAG })?;
    Ok(())
}

fn write_basic_channel<W: Write>(
    writer: &mut W,
    channel: &ChannelFeatures,
) -> Result<(), AnalysisError> {
    for array in [
        &channel.volume,
        &channel.rise_plus_fall,
        &channel.rise_minus_fall,
    ] {
        for value in array {
            writeln!(writer, "{}", value)?;
        }
    }
    Ok(())
}

fn write_temporal_channel<W: Write>(
    writer: &mut W,
    channel: &ChannelFeatures,
) -> Result<(), AnalysisError> {
    // validate_against_layout has already established presence.
    let temporal = channel.temporal.as_ref().ok_or_else(|| {
        AnalysisError::InvalidInput("channel has no temporal features to save".to_string())
    })?;
    for value in temporal.correlation.values() {
        writeln!(writer, "{}", value)?;
    }
    for value in temporal.peak_rates.values() {
        writeln!(writer, "{}", value)?;
    }
    Ok(())
}

fn read_basic_channel<R: BufRead>(
    reader: &mut ValueReader<R>,
    layout: &FeatureLayout,
) -> Result<ChannelFeatures, AnalysisError> {
    Ok(ChannelFeatures {
        volume: reader.read_array::<f64>(layout.bin_count)?,
        rise_plus_fall: reader.read_array::<f64>(layout.bin_count)?,
        rise_minus_fall: reader.read_array::<f64>(layout.bin_count)?,
        temporal: None,
    })
}

fn read_temporal_channel<R: BufRead>(
    reader: &mut ValueReader<R>,
    layout: &FeatureLayout,
) -> Result<TemporalFeatures, AnalysisError> {
    let correlation = reader.read_array::<f32>(layout.correlation_len())?;
    let peak_rates = reader.read_array::<f64>(layout.peak_rate_len())?;
    Ok(TemporalFeatures {
        correlation: CorrelationTensor::from_values(
            correlation,
            layout.bin_count,
            layout.lag_count,
        ),
        peak_rates: PeakRateTable::from_values(
            peak_rates,
            layout.bin_count,
            layout.rate_min,
            layout.rate_max,
        ),
    })
}

/// Line-by-line reader that turns truncation and parse failures into
/// `Malformed` errors naming the file and line.
struct ValueReader<R: BufRead> {
    lines: std::io::Lines<R>,
    context: String,
    line_number: usize,
}

impl<R: BufRead> ValueReader<R> {
    fn new(reader: R, path: &Path) -> Self {
        Self {
            lines: reader.lines(),
            context: path.display().to_string(),
            line_number: 0,
        }
    }

    fn next_line(&mut self) -> Result<String, AnalysisError> {
        self.line_number += 1;
        match self.lines.next() {
            Some(line) => Ok(line?),
            None => Err(AnalysisError::Malformed(format!(
                "{}: unexpected end of file at line {}",
                self.context, self.line_number
            ))),
        }
    }

    fn read_flag(&mut self) -> Result<bool, AnalysisError> {
        let line = self.next_line()?;
        match line.as_str() {
            STEREO_FLAG => Ok(true),
            MONO_FLAG => Ok(false),
            other => Err(AnalysisError::Malformed(format!(
                "{}: expected channel flag on line {}, found {:?}",
                self.context, self.line_number, other
            ))),
        }
    }

    fn read_array<T>(&mut self, len: usize) -> Result<Vec<T>, AnalysisError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            let line = self.next_line()?;
            values.push(line.trim().parse::<T>().map_err(|e| {
                AnalysisError::Malformed(format!(
                    "{}: bad value on line {}: {}",
                    self.context, self.line_number, e
                ))
            })?);
        }
        Ok(values)
    }

    fn expect_end(&mut self) -> Result<(), AnalysisError> {
        if self.lines.next().is_some() {
            return Err(AnalysisError::Malformed(format!(
                "{}: trailing data after line {}",
                self.context, self.line_number
            )));
        }
        Ok(())
    }
}
