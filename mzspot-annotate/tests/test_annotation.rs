use mzpeaks::CentroidPeak;

use mzspot::{
    AlignmentChromPeakFeature, AlignmentSpotProperty, AnalysisFile, ChromXs, ChromatogramPeakFeature,
    MatchSource, MsScanMatchResult, QuantMassLookup, Technology, NOT_APPLICABLE,
};
use mzspot_annotate::{
    annotate_spots, read_msp_file, AnnotationError, Annotator, MoleculeMsReference, MsQuery,
    MsRefSearchParameter, MspAnnotator, ReferenceLibrary, SecondaryKey, TextDbAnnotator,
};

fn spectrum(peaks: &[(f64, f32)]) -> Vec<CentroidPeak> {
    peaks
        .iter()
        .enumerate()
        .map(|(i, (mz, int))| CentroidPeak::new(*mz, *int, i as u32))
        .collect()
}

fn open_params() -> MsRefSearchParameter {
    MsRefSearchParameter {
        ms1_tolerance: 0.01,
        total_score_cutoff: 0.0,
        ..Default::default()
    }
}

#[test_log::test]
fn test_scenario_close_masses_ranked_by_spectrum() -> Result<(), AnnotationError> {
    let references = read_msp_file("tests/data/small_library.msp")?;
    assert_eq!(references.len(), 3);
    let annotator = MspAnnotator::new("msp", references, SecondaryKey::RT, open_params())?;

    let query_spectrum = spectrum(&[(100.0, 1000.0), (180.0, 800.0), (250.0, 400.0)]);
    let query = MsQuery::new(Some(300.1002), ChromXs::from_rt(5.05), &query_spectrum);

    let hits = annotator.search(&query, None)?;
    assert_eq!(hits.len(), 2);

    let candidates = annotator.find_candidates(&query, None)?;
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].name, "Compound B");
    assert!(candidates[0].weighted_dot_product > candidates[1].weighted_dot_product);
    assert!(candidates[0].total_score >= candidates[1].total_score);
    assert_eq!(candidates[0].source, MatchSource::Msp);
    assert!(annotator.is_reference_match(&candidates[0], None));

    let best = annotator.annotate(&query, None)?.unwrap();
    assert_eq!(best.library_id, candidates[0].library_id);
    let reference = annotator.refer(&best).unwrap();
    assert_eq!(reference.inchikey, "BBBBBBBBBBBBBB-UHFFFAOYSA-N");
    Ok(())
}

#[test_log::test]
fn test_total_score_cutoff_and_override() -> Result<(), AnnotationError> {
    let references = read_msp_file("tests/data/small_library.msp")?;
    let strict = MsRefSearchParameter {
        total_score_cutoff: 0.95,
        ..open_params()
    };
    let annotator = MspAnnotator::new("msp", references, SecondaryKey::RT, strict)?;
    let query_spectrum = spectrum(&[(100.0, 1000.0), (180.0, 800.0), (250.0, 400.0)]);
    let query = MsQuery::new(Some(300.1002), ChromXs::from_rt(5.05), &query_spectrum);

    let strict_hits = annotator.find_candidates(&query, None)?;
    assert_eq!(strict_hits.len(), 1);
    let relaxed = open_params();
    assert_eq!(annotator.find_candidates(&query, Some(&relaxed))?.len(), 2);
    // the override does not leak into the annotator's own configuration
    assert_eq!(annotator.parameters().total_score_cutoff, 0.95);
    Ok(())
}

#[test_log::test]
fn test_tolerance_monotonicity_above_breakpoint() {
    let library: ReferenceLibrary = (0..200)
        .map(|i| MoleculeMsReference::new(i, format!("r{i}"), 799.9 + i as f64 * 0.001))
        .collect();
    let mz = 800.0;
    let mut previous: Option<std::ops::Range<usize>> = None;
    for tolerance in [0.001, 0.002, 0.005, 0.01, 0.02, 0.05, 0.1] {
        let params = MsRefSearchParameter {
            ms1_tolerance: tolerance,
            ..Default::default()
        };
        let range = library.candidate_range(mz, &params);
        if let Some(prev) = previous {
            assert!(range.start <= prev.start, "{range:?} vs {prev:?}");
            assert!(range.end >= prev.end, "{range:?} vs {prev:?}");
        }
        previous = Some(range);
    }
}

#[test_log::test]
fn test_spectrum_match_requires_every_cutoff() -> Result<(), AnnotationError> {
    let params = MsRefSearchParameter {
        use_ccs_for_scoring: true,
        minimum_matched_peaks: 3,
        ..open_params()
    };
    let reference = MoleculeMsReference::new(7, "X", 300.1)
        .with_ccs(150.0)
        .with_spectrum(spectrum(&[(100.0, 1000.0)]));
    let annotator = MspAnnotator::new("msp", vec![reference.clone()], SecondaryKey::None, params)?;

    let mut feature = ChromatogramPeakFeature::new(0, 4.9, 5.0, 5.1, 300.1, 1e4);
    feature.ccs = Some(150.0);
    feature.spectrum = spectrum(&[(400.0, 1000.0)]);
    let result = annotator.calculate_score(&MsQuery::from_feature(&feature), &reference, None)?;
    assert!(result.is_precursor_mz_match);
    assert!(result.is_ccs_match);
    assert!((result.accurate_mass_similarity - 1.0).abs() < 1e-12);
    assert!((result.ccs_similarity - 1.0).abs() < 1e-12);
    assert_eq!(result.weighted_dot_product, 0.0);
    assert!(!result.is_spectrum_match);
    assert!(!annotator.is_reference_match(&result, None));

    // a perfect spectrum that is too small to meet the matched peak count
    feature.spectrum = spectrum(&[(100.0, 1000.0)]);
    let result = annotator.calculate_score(&MsQuery::from_feature(&feature), &reference, None)?;
    assert!((result.weighted_dot_product - 1.0).abs() < 1e-9);
    assert!((result.matched_peaks_percentage - 1.0).abs() < 1e-12);
    assert!(!result.is_spectrum_match);
    Ok(())
}

#[test_log::test]
fn test_total_score_is_mean_of_applicable_criteria() -> Result<(), AnnotationError> {
    let params = MsRefSearchParameter {
        use_time_for_scoring: true,
        ..open_params()
    };
    let reference = MoleculeMsReference::new(1, "Y", 300.1).with_rt(5.0);
    let annotator = TextDbAnnotator::new("textdb", vec![reference.clone()], SecondaryKey::RT, params)?;
    let query = MsQuery::new(Some(300.105), ChromXs::from_rt(5.25), &[]);
    let result = annotator.calculate_score(&query, &reference, None)?;

    assert_eq!(result.weighted_dot_product, NOT_APPLICABLE);
    assert_eq!(result.ccs_similarity, NOT_APPLICABLE);
    assert_eq!(result.isotope_similarity, NOT_APPLICABLE);
    let expected = (result.accurate_mass_similarity + result.rt_similarity) / 2.0;
    assert!((result.total_score - expected).abs() < 1e-12);
    assert!((result.total_score - (-0.125f64).exp()).abs() < 1e-6);
    assert!(result.is_precursor_mz_match);
    assert!(result.is_rt_match);
    assert!(annotator.is_reference_match(&result, None));
    Ok(())
}

#[test_log::test]
fn test_annotate_spots_keeps_manual_identifications() -> Result<(), AnnotationError> {
    let references = read_msp_file("tests/data/small_library.msp")?;
    let annotator = MspAnnotator::new("msp", references, SecondaryKey::RT, open_params())?;

    let file = AnalysisFile::new(0, "sample_0");
    let make_spot = || {
        let mut feature = ChromatogramPeakFeature::new(0, 4.95, 5.0, 5.05, 300.1002, 1e4);
        feature.spectrum = spectrum(&[(100.0, 1000.0), (180.0, 800.0), (250.0, 400.0)]);
        AlignmentSpotProperty::new(vec![AlignmentChromPeakFeature::from_feature(&file, feature)])
    };
    let mut manual = make_spot();
    manual.set_match(MsScanMatchResult {
        name: "Curated".to_string(),
        library_id: 42,
        source: MatchSource::Manual,
        is_spectrum_match: true,
        ..Default::default()
    });
    let mut spots = vec![manual, make_spot()];

    let identified = annotate_spots(&mut spots, &annotator, Technology::LcMs, None)?;
    assert_eq!(identified, 1);
    assert_eq!(spots[0].name, "Curated");
    assert_eq!(spots[0].library_id, 42);
    assert_eq!(spots[1].name, "Compound B");
    assert!(spots[1].is_identified());
    Ok(())
}

#[test_log::test]
fn test_library_resolves_quant_mass() {
    let mut reference = MoleculeMsReference::new(11, "Glycine 3TMS", 0.0).with_ri(1305.0);
    reference.quant_mass = Some(174.0);
    let library = ReferenceLibrary::new(vec![reference], SecondaryKey::RI);
    let result = MsScanMatchResult {
        library_id: 11,
        library_id_when_ordered: 0,
        ..Default::default()
    };
    assert_eq!(library.reference_quant_mass(&result), Some(174.0));
}
