use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::{fit::FitKind, output::FitRecord, AngfitError, AngfitResult, Float};

/// Extract the `[lower,upper)` part of a record name or label and parse its edges.
///
/// The search starts at the first `'['` and ends at the next `')'`, so `"fit-logl-M[100,200)"`
/// and `"cos-M[100,200)"` both give `("[100,200)", 100.0, 200.0)`.
pub fn parse_bin_label(name: &str) -> AngfitResult<(&str, Float, Float)> {
    let parse_error = || AngfitError::ParseError {
        name: name.to_string(),
        object: "bin label".to_string(),
    };
    let start = name.find('[').ok_or_else(parse_error)?;
    let end = name[start..]
        .find(')')
        .map(|offset| start + offset)
        .ok_or_else(parse_error)?;
    let label = &name[start..=end];
    let (lower, upper) = label[1..label.len() - 1]
        .split_once(',')
        .ok_or_else(parse_error)?;
    let lower = lower.trim().parse().map_err(|_| parse_error())?;
    let upper = upper.trim().parse().map_err(|_| parse_error())?;
    Ok((label, lower, upper))
}

/// Key records of one kind by bin label, ordered by lower edge.
fn by_bin(
    records: &[FitRecord],
    kind: FitKind,
) -> AngfitResult<Vec<(String, Float, Float, &FitRecord)>> {
    let mut bins = records
        .iter()
        .filter(|record| record.kind == kind)
        .map(|record| {
            let (label, lower, upper) = parse_bin_label(&record.name)?;
            Ok((label.to_string(), lower, upper, record))
        })
        .collect::<AngfitResult<Vec<_>>>()?;
    bins.sort_by(|a, b| a.1.total_cmp(&b.1));
    Ok(bins)
}

/// One bin of a likelihood-ratio comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlrRow {
    /// Lower edge of the bin.
    pub lower: Float,
    /// Upper edge of the bin.
    pub upper: Float,
    /// $`-2\ln\mathcal{L}_{\text{ref}} - (-2\ln\mathcal{L}_{\text{alt}})`$
    pub llr: Float,
    /// $`P(\chi^2_1 > \text{LLR})`$
    pub p_value: Float,
}

/// Compare the log-likelihood fits of a reference run against those of an alternative one,
/// bin by bin.
///
/// Bins are matched by their `[lower,upper)` label. Every bin of the reference must also be
/// present in the alternative; extra bins in the alternative are ignored. Rows are returned
/// in ascending order of the lower edge. A non-positive LLR gives a p-value of 1.
pub fn likelihood_ratio(
    reference: &[FitRecord],
    alternative: &[FitRecord],
) -> AngfitResult<Vec<LlrRow>> {
    let chi2 = ChiSquared::new(1.0).map_err(|e| AngfitError::Custom(e.to_string()))?;
    let alternative: BTreeMap<String, Float> = by_bin(alternative, FitKind::LogL)?
        .into_iter()
        .map(|(label, _, _, record)| (label, record.objective))
        .collect();
    by_bin(reference, FitKind::LogL)?
        .into_iter()
        .map(|(label, lower, upper, record)| {
            let alt = alternative
                .get(&label)
                .ok_or_else(|| AngfitError::MissingEntry { key: label.clone() })?;
            let llr = record.objective - alt;
            Ok(LlrRow {
                lower,
                upper,
                llr,
                p_value: (1.0 - chi2.cdf(llr as f64)) as Float,
            })
        })
        .collect()
}

/// One bin of a [`parameter_table`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterRow {
    /// Lower edge of the bin.
    pub lower: Float,
    /// Upper edge of the bin.
    pub upper: Float,
    /// Fitted value.
    pub value: Float,
    /// Fitted error.
    pub error: Float,
}

/// Collect, for each parameter name, the fitted value and error across bins from the records
/// of one fit kind.
///
/// Parameters appear in the order of their first occurrence and rows in ascending order of the
/// lower edge.
pub fn parameter_table(
    records: &[FitRecord],
    kind: FitKind,
) -> AngfitResult<IndexMap<String, Vec<ParameterRow>>> {
    let mut table: IndexMap<String, Vec<ParameterRow>> = IndexMap::new();
    for (_, lower, upper, record) in by_bin(records, kind)? {
        for (name, &(value, error)) in &record.parameters {
            table.entry(name.clone()).or_default().push(ParameterRow {
                lower,
                upper,
                value,
                error,
            });
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::FitResult;
    use approx::assert_relative_eq;

    fn record(kind: FitKind, label: &str, objective: Float, c2: Float) -> FitRecord {
        let mut parameters = IndexMap::new();
        parameters.insert("c2".to_string(), (c2, 0.1));
        parameters.insert("c4".to_string(), (0.0, 0.2));
        FitRecord::new(
            label,
            &FitResult {
                kind,
                parameters,
                objective,
                converged: true,
            },
        )
    }

    #[test]
    fn test_parse_bin_label() {
        let (label, lower, upper) = parse_bin_label("fit-logl-M[100,200)").unwrap();
        assert_eq!(label, "[100,200)");
        assert_relative_eq!(lower, 100.0);
        assert_relative_eq!(upper, 200.0);
        let (_, lower, upper) = parse_bin_label("cos-M[-0.5, 1.5)").unwrap();
        assert_relative_eq!(lower, -0.5);
        assert_relative_eq!(upper, 1.5);
        assert!(parse_bin_label("fit-logl-M").is_err());
        assert!(parse_bin_label("M[100,200]").is_err());
        assert!(parse_bin_label("M[a,200)").is_err());
    }

    #[test]
    fn test_likelihood_ratio() {
        let reference = vec![
            record(FitKind::LogL, "M[200,300)", -10.0, 0.0),
            record(FitKind::Chi2, "M[100,200)", 99.0, 0.0),
            record(FitKind::LogL, "M[100,200)", -4.0, 0.0),
        ];
        let alternative = vec![
            record(FitKind::LogL, "M[100,200)", -8.0, 0.0),
            record(FitKind::LogL, "M[200,300)", -9.0, 0.0),
            record(FitKind::LogL, "M[300,400)", -1.0, 0.0),
        ];
        let rows = likelihood_ratio(&reference, &alternative).unwrap();
        assert_eq!(rows.len(), 2);
        assert_relative_eq!(rows[0].lower, 100.0);
        assert_relative_eq!(rows[0].llr, 4.0);
        // P(chi2_1 > 4) = erfc(sqrt(2))
        assert_relative_eq!(rows[0].p_value, 0.0455002638963584, epsilon = 1e-6);
        assert_relative_eq!(rows[1].upper, 300.0);
        assert_relative_eq!(rows[1].llr, -1.0);
        assert_relative_eq!(rows[1].p_value, 1.0);
    }

    #[test]
    fn test_likelihood_ratio_missing_bin() {
        let reference = vec![record(FitKind::LogL, "M[100,200)", -4.0, 0.0)];
        let alternative = vec![record(FitKind::LogL, "M[200,300)", -4.0, 0.0)];
        assert!(matches!(
            likelihood_ratio(&reference, &alternative),
            Err(AngfitError::MissingEntry { .. })
        ));
    }

    #[test]
    fn test_parameter_table() {
        let records = vec![
            record(FitKind::LogL, "M[200,300)", 0.0, 0.3),
            record(FitKind::Chi2, "M[100,200)", 0.0, 0.9),
            record(FitKind::LogL, "M[100,200)", 0.0, 0.1),
        ];
        let table = parameter_table(&records, FitKind::LogL).unwrap();
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["c2", "c4"]);
        let c2 = &table["c2"];
        assert_eq!(c2.len(), 2);
        assert_relative_eq!(c2[0].lower, 100.0);
        assert_relative_eq!(c2[0].value, 0.1);
        assert_relative_eq!(c2[1].value, 0.3);
        assert_relative_eq!(table["c4"][1].error, 0.2);
    }
}
