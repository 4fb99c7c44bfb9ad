use std::{collections::BTreeMap, io::Write};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    binning::{axis::UniformAxis, histogram::Histogram},
    data::RunTotals,
    fit::{BinFit, FitKind, FitResult},
    AngfitError, AngfitResult, Float,
};

/// A named, persistable record of one fit of one bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitRecord {
    /// `"fit-<kind>-<label>"`.
    pub name: String,
    /// `"chi2 = <v>"` or `"-2LogL = <v>"`.
    pub title: String,
    /// The fit kind.
    pub kind: FitKind,
    /// The bin label, `"<aux>[lower,upper)"`.
    pub label: String,
    /// Parameter name to `(value, error)`.
    pub parameters: IndexMap<String, (Float, Float)>,
    /// The objective at the best point.
    pub objective: Float,
    /// Whether the minimizer converged.
    pub converged: bool,
}

impl FitRecord {
    /// Build the record of a [`FitResult`] for the bin labeled `label`.
    pub fn new(label: &str, result: &FitResult) -> Self {
        Self {
            name: format!("fit-{}-{}", result.kind, label),
            title: result.kind.title(result.objective),
            kind: result.kind,
            label: label.to_string(),
            parameters: result.parameters.clone(),
            objective: result.objective,
            converged: result.converged,
        }
    }
}

/// The consumer of everything an analysis produces.
///
/// [`FitSink::begin`] is called once before the first bin and [`FitSink::finish`] once after
/// the last. In between, [`FitSink::write_bin`] is called once per bin, in ascending order, as
/// soon as the bin is fit.
pub trait FitSink {
    /// Called before the first bin with the run totals and the axis configuration.
    fn begin(
        &mut self,
        _totals: &RunTotals,
        _axes: &BTreeMap<String, UniformAxis>,
    ) -> AngfitResult<()> {
        Ok(())
    }
    /// Store a named histogram.
    fn write_histogram(&mut self, name: &str, histogram: &Histogram) -> AngfitResult<()>;
    /// Store a fit record.
    fn write_fit(&mut self, record: &FitRecord) -> AngfitResult<()>;
    /// Store everything belonging to one bin: by default its histogram and both fit records.
    fn write_bin(&mut self, bin: &BinFit) -> AngfitResult<()> {
        self.write_histogram(&bin.histogram_name, &bin.histogram)?;
        for record in bin.records() {
            self.write_fit(&record)?;
        }
        Ok(())
    }
    /// Called after the last bin.
    fn finish(&mut self) -> AngfitResult<()> {
        Ok(())
    }
}

/// A [`FitSink`] which keeps everything in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    /// The run totals, once [`FitSink::begin`] was called.
    pub totals: Option<RunTotals>,
    /// Named histograms, in the order they were written.
    pub histograms: Vec<(String, Histogram)>,
    /// Fit records, in the order they were written.
    pub fits: Vec<FitRecord>,
}

impl MemorySink {
    /// The records of one fit kind.
    pub fn fits_of(&self, kind: FitKind) -> impl Iterator<Item = &FitRecord> {
        self.fits.iter().filter(move |r| r.kind == kind)
    }
    /// A histogram by name.
    pub fn histogram(&self, name: &str) -> Option<&Histogram> {
        self.histograms
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, h)| h)
    }
}

impl FitSink for MemorySink {
    fn begin(
        &mut self,
        totals: &RunTotals,
        _axes: &BTreeMap<String, UniformAxis>,
    ) -> AngfitResult<()> {
        self.totals = Some(*totals);
        Ok(())
    }
    fn write_histogram(&mut self, name: &str, histogram: &Histogram) -> AngfitResult<()> {
        self.histograms.push((name.to_string(), histogram.clone()));
        Ok(())
    }
    fn write_fit(&mut self, record: &FitRecord) -> AngfitResult<()> {
        self.fits.push(record.clone());
        Ok(())
    }
}

#[derive(Serialize)]
struct BinFits<'a> {
    chi2: &'a IndexMap<String, (Float, Float)>,
    logl: &'a IndexMap<String, (Float, Float)>,
}

/// A [`FitSink`] which streams the analysis as one JSON array:
///
/// ```text
/// [{"weight":[w],"entries":[n],"ncount":[c]},
///  {"M":[nbins,lower,upper],"cos":[nbins,lower,upper]},
///  [[lower,upper],{"chi2":{"c2":[v,e],...,"A":[v,e]},"logl":{"c2":[v,e],...}},[[w,w2,n],...]],
///  ...]
/// ```
///
/// Each bin is written as soon as it is fit. Non-finite numbers are written as `null`.
#[derive(Debug)]
pub struct JsonWriter<W: Write> {
    writer: W,
    started: bool,
}

impl<W: Write> JsonWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            started: false,
        }
    }
    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FitSink for JsonWriter<W> {
    fn begin(
        &mut self,
        totals: &RunTotals,
        axes: &BTreeMap<String, UniformAxis>,
    ) -> AngfitResult<()> {
        self.writer.write_all(b"[")?;
        serde_json::to_writer(&mut self.writer, totals)?;
        self.writer.write_all(b",")?;
        serde_json::to_writer(&mut self.writer, axes)?;
        self.started = true;
        Ok(())
    }
    // the layout groups histograms and fits by bin, see `write_bin`
    fn write_histogram(&mut self, _name: &str, _histogram: &Histogram) -> AngfitResult<()> {
        Ok(())
    }
    fn write_fit(&mut self, _record: &FitRecord) -> AngfitResult<()> {
        Ok(())
    }
    fn write_bin(&mut self, bin: &BinFit) -> AngfitResult<()> {
        if !self.started {
            return Err(AngfitError::Custom(
                "JSON output needs its header before the first bin".to_string(),
            ));
        }
        self.writer.write_all(b",")?;
        let entry = (
            [bin.lower, bin.upper],
            BinFits {
                chi2: &bin.chi2.parameters,
                logl: &bin.logl.parameters,
            },
            bin.histogram.bins(),
        );
        serde_json::to_writer(&mut self.writer, &entry)?;
        Ok(())
    }
    fn finish(&mut self) -> AngfitResult<()> {
        if self.started {
            self.writer.write_all(b"]")?;
            self.started = false;
        }
        self.writer.flush()?;
        Ok(())
    }
}
