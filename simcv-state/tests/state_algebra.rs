use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use simcv_core::{CvError, Settings};
use simcv_state::{preparations, Advisory, Context, Operand, Projection, State};

const TOL: f64 = 1e-9;

fn coherent(x: f64, y: f64) -> State {
    preparations::coherent(&Context::default(), &[x], &[y]).unwrap()
}

fn probability_sum(state: &State, cutoff: usize) -> f64 {
    state.ket(Some(&[cutoff])).unwrap().iter().map(Complex64::norm_sqr).sum()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_builder_requires_exactly_one_representation() {
    assert!(matches!(State::builder().build(), Err(CvError::InvalidState(_))));

    let ket = preparations::vacuum(&Context::default(), 1).unwrap().ket(None).unwrap();
    let both = State::builder()
        .gaussian(DMatrix::identity(2, 2), DVector::zeros(2))
        .ket(ket)
        .build();
    assert!(matches!(both, Err(CvError::InvalidState(_))));
}

#[test]
fn test_builder_rejects_unphysical_covariance() {
    let squeezed_below_vacuum = State::builder()
        .gaussian(DMatrix::identity(2, 2) * 0.1, DVector::zeros(2))
        .build();
    assert!(matches!(squeezed_below_vacuum, Err(CvError::InvalidState(_))));

    let wrong_means = State::builder()
        .gaussian(DMatrix::identity(2, 2), DVector::zeros(3))
        .build();
    assert!(wrong_means.is_err());

    let duplicate_labels = State::builder()
        .gaussian(DMatrix::identity(4, 4), DVector::zeros(4))
        .modes(vec![2, 2])
        .build();
    assert!(duplicate_labels.is_err());
}

#[test]
fn test_symplectic_construction() {
    let ctx = Context::default();
    let nbar = 0.4;
    let nu = ctx.hbar() / 2.0 * (2.0 * nbar + 1.0);
    let state = State::builder()
        .symplectic(DVector::from_element(1, nu), DMatrix::identity(2, 2))
        .build()
        .unwrap();
    assert_eq!(state, preparations::thermal(&ctx, &[nbar]).unwrap());
}

#[test]
fn test_vacuum_ket() {
    let vacuum = preparations::vacuum(&Context::default(), 1).unwrap();
    let ket = vacuum.ket(Some(&[3])).unwrap();
    assert_relative_eq!(ket[&[0usize][..]].re, 1.0, epsilon = TOL);
    assert_relative_eq!(ket[&[1usize][..]].norm(), 0.0, epsilon = TOL);
    assert_relative_eq!(ket[&[2usize][..]].norm(), 0.0, epsilon = TOL);
}

#[test]
fn test_hbar_from_context() {
    let ctx = Context::with_settings(Settings::new().with_hbar(1.0)).unwrap();
    let vacuum = preparations::vacuum(&ctx, 1).unwrap();
    assert_relative_eq!(vacuum.cov().unwrap()[(0, 0)], 0.5, epsilon = TOL);
    assert_relative_eq!(vacuum.purity().unwrap(), 1.0, epsilon = TOL);
}

// ============================================================================
// Derived quantities
// ============================================================================

#[test]
fn test_traced_two_mode_squeezed_vacuum_is_mixed() {
    let ctx = Context::default();
    let tmsv = preparations::two_mode_squeezed_vacuum(&ctx, 0.4, 0.0).unwrap();
    let arm = tmsv.get_modes(&[0]).unwrap();
    assert!(arm.purity().unwrap() < 1.0);
    assert!(arm.is_mixed().unwrap());
    assert!(matches!(arm.ket(None), Err(CvError::Unsupported(_))));

    let fock = State::builder().ket(tmsv.ket(Some(&[12, 12])).unwrap()).build().unwrap();
    let fock_arm = fock.get_modes(&[1]).unwrap();
    assert_relative_eq!(fock_arm.purity().unwrap(), arm.purity().unwrap(), epsilon = 1e-6);
}

#[test]
fn test_probabilities_grow_with_cutoff() {
    let state = coherent(0.8, 0.5);
    let sums: Vec<f64> = [2, 4, 8, 16].iter().map(|&c| probability_sum(&state, c)).collect();
    for pair in sums.windows(2) {
        assert!(pair[0] <= pair[1] + TOL);
    }
    assert!(sums.iter().all(|&s| s <= 1.0 + TOL));
    assert_relative_eq!(sums[3], 1.0, epsilon = 1e-6);

    let total: f64 = state.fock_probabilities().unwrap().sum();
    assert!(total <= 1.0 + TOL);
}

#[test]
fn test_autocutoffs_follow_photon_statistics() {
    let ctx = Context::default();
    let small = coherent(0.1, 0.0).cutoffs().unwrap().to_vec();
    let large = coherent(2.0, 0.0).cutoffs().unwrap().to_vec();
    assert!(large[0] > small[0]);

    let fixed = State::builder()
        .gaussian(DMatrix::identity(2, 2) * (ctx.hbar() / 2.0), DVector::zeros(2))
        .cutoffs(vec![7])
        .build()
        .unwrap();
    assert_eq!(fixed.shape().unwrap(), vec![7]);
}

#[test]
fn test_autocutoffs_keep_the_last_likely_photon() {
    let ctx = Context::default();
    let weak = coherent(0.1, 0.0);
    assert_eq!(weak.cutoffs().unwrap(), &[2]);

    let one = preparations::fock(&ctx, &[1], None).unwrap();
    let p = one.primal(Operand::State(&weak)).unwrap().probability().unwrap();
    assert_relative_eq!(p, 0.01 * (-0.01f64).exp(), epsilon = 1e-10);

    let thermal = preparations::thermal(&ctx, &[0.3]).unwrap();
    assert_eq!(thermal.cutoffs().unwrap(), &[5]);
    let product = (&thermal & &one).unwrap();
    assert_eq!(product.get_modes(&[0]).unwrap(), thermal);

    let number = product.get_modes(&[1]).unwrap();
    let truncated_weight = 1.0 - (0.3f64 / 1.3).powi(5);
    assert_relative_eq!(number.norm(), truncated_weight, epsilon = 1e-9);
    assert_relative_eq!(number.number_means().unwrap()[0], 1.0, epsilon = TOL);
}

#[test]
fn test_number_statistics() {
    let ctx = Context::default();
    let thermal = preparations::thermal(&ctx, &[1.5]).unwrap();
    let stdev = thermal.number_stdev().unwrap();
    assert_relative_eq!(stdev[0], (1.5f64 * 1.5 + 1.5).sqrt(), epsilon = TOL);

    let number = preparations::fock(&ctx, &[3], None).unwrap();
    assert_relative_eq!(number.number_stdev().unwrap()[0], 0.0, epsilon = TOL);
    assert!(matches!(number.number_cov(), Err(CvError::Unsupported(_))));
}

// ============================================================================
// Composition and marginals
// ============================================================================

#[test]
fn test_composed_vacua() {
    let ctx = Context::default();
    let a = preparations::vacuum(&ctx, 1).unwrap();
    let composed = (&a & &a).unwrap();
    assert_eq!(composed.modes(), &[0, 1]);
    assert_relative_eq!(
        composed.cov().unwrap(),
        &(DMatrix::identity(4, 4) * (ctx.hbar() / 2.0)),
        epsilon = TOL
    );
    assert_relative_eq!(composed.means().unwrap(), &DVector::zeros(4), epsilon = TOL);
}

#[test]
fn test_composition_marginals_recover_factors() {
    let ctx = Context::default();
    let a = coherent(0.3, -0.2);
    let b = preparations::squeezed_vacuum(&ctx, &[0.5], &[0.3]).unwrap();
    let ab = (&a & &b).unwrap();
    assert_eq!(ab.get_modes(&[0]).unwrap(), a);
    assert_eq!(ab.get_modes(&[1]).unwrap(), b);

    let marginals: Vec<State> = ab.single_mode_marginals().collect::<Result<_, _>>().unwrap();
    assert_eq!(marginals.len(), 2);
    assert_eq!(marginals[1], b);
}

#[test]
fn test_fock_composition() {
    let ctx = Context::default();
    let one = preparations::fock(&ctx, &[1], None).unwrap();
    let two = preparations::fock(&ctx, &[2], None).unwrap();
    let both = (&one & &two).unwrap();
    assert_eq!(both.cutoffs().unwrap(), &[2, 3]);
    assert_eq!(both.get_modes(&[1]).unwrap(), two);
    assert!(both.get_modes(&[5]).is_err());
}

// ============================================================================
// Equality
// ============================================================================

#[test]
fn test_equality_across_representations() {
    let gaussian = coherent(0.4, 0.1);
    let ket = State::builder().ket(gaussian.ket(None).unwrap()).build().unwrap();
    let dm = State::builder().dm(gaussian.dm(None).unwrap()).build().unwrap();

    for a in [&gaussian, &ket, &dm] {
        assert_eq!(a, a);
        for b in [&gaussian, &ket, &dm] {
            assert_eq!(a == b, b == a);
            assert_eq!(a, b);
        }
    }
    assert_ne!(gaussian, coherent(0.4, 0.3));
}

#[test]
fn test_ket_equality_ignores_global_phase() {
    let ket = coherent(0.2, 0.0).ket(Some(&[10])).unwrap();
    let a = State::builder().ket(ket.clone()).build().unwrap();
    let b = State::builder()
        .ket(ket.mapv(|z| z * Complex64::from_polar(1.0, 0.7)))
        .build()
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_equality_pads_smaller_cutoffs() {
    let ctx = Context::default();
    let short = preparations::fock(&ctx, &[1], None).unwrap();
    let long = preparations::fock(&ctx, &[1], Some(&[6])).unwrap();
    assert_eq!(short, long);
    assert_eq!(long, short);
}

// ============================================================================
// Projection and transformations
// ============================================================================

#[test]
fn test_coherent_overlap_probability() {
    let measured = coherent(0.5, 0.2);
    let projector = coherent(0.1, -0.1);
    let p = projector.primal(Operand::State(&measured)).unwrap().probability().unwrap();
    let distance = 0.4f64.powi(2) + 0.3f64.powi(2);
    assert_relative_eq!(p, (-distance).exp(), epsilon = 1e-8);
    assert!((0.0..=1.0).contains(&p));
}

#[test]
fn test_conditional_covariance_is_symmetric() {
    let ctx = Context::default();
    let tmsv = preparations::two_mode_squeezed_vacuum(&ctx, 0.7, 0.2).unwrap();
    let extra = preparations::squeezed_vacuum(&ctx, &[0.3], &[1.0]).unwrap();
    let measured = (&tmsv & &extra).unwrap();
    let projector = preparations::displaced_squeezed(&ctx, &[0.4], &[0.5], &[0.2], &[0.1]).unwrap();

    let outcome = projector.primal(Operand::State(&measured)).unwrap();
    let state = outcome.into_state().unwrap();
    assert_eq!(state.modes(), &[1, 2]);
    let cov = state.cov().unwrap();
    assert_relative_eq!(cov, &cov.transpose(), epsilon = TOL);
    assert!(state.norm() > 0.0 && state.norm() <= 1.0);
}

#[test]
fn test_gaussian_measured_by_number_state() {
    let ctx = Context::default();
    let measured = coherent(0.6, 0.0);
    let projector = preparations::fock(&ctx, &[0], None).unwrap();
    let p = projector.primal(Operand::State(&measured)).unwrap().probability().unwrap();
    assert_relative_eq!(p, (-0.36f64).exp(), epsilon = 1e-6);
}

#[test]
fn test_fock_projection_across_purities() {
    let joint = (&coherent(0.3, 0.1) & &coherent(-0.2, 0.4)).unwrap();
    let ket = joint.ket(Some(&[15, 15])).unwrap();
    let measured_ket = State::builder().ket(ket).build().unwrap();
    let measured_dm = State::builder().dm(measured_ket.dm(None).unwrap()).build().unwrap();

    let gamma = coherent(0.1, -0.1);
    let projector_ket = State::builder().ket(gamma.ket(Some(&[15])).unwrap()).build().unwrap();
    let projector_dm = State::builder().dm(gamma.dm(Some(&[15])).unwrap()).build().unwrap();

    let expected = (-(0.2f64.powi(2) + 0.2f64.powi(2))).exp();
    for measured in [&measured_ket, &measured_dm] {
        for projector in [&projector_ket, &projector_dm] {
            let rest = projector.primal(Operand::State(measured)).unwrap().into_state().unwrap();
            assert_eq!(rest.modes(), &[1]);
            assert_relative_eq!(rest.norm(), expected, epsilon = 1e-8);

            let marginal = measured.get_modes(&[0]).unwrap();
            let p = projector.primal(Operand::State(&marginal)).unwrap().probability().unwrap();
            assert_relative_eq!(p, expected, epsilon = 1e-8);
        }
    }
}

#[test]
fn test_number_state_heralding() {
    let ctx = Context::default();
    let measured = preparations::fock(&ctx, &[1, 2], None).unwrap();
    let projector = preparations::fock(&ctx, &[1], None).unwrap();
    match projector.primal(Operand::State(&measured)).unwrap() {
        Projection::State(rest) => {
            assert_eq!(rest.modes(), &[1]);
            assert_eq!(rest, preparations::fock(&ctx, &[2], None).unwrap());
        }
        Projection::Probability(_) => panic!("one mode should remain"),
    }
}

#[test]
fn test_then_rejects_state_operand() {
    let a = coherent(0.1, 0.0);
    let err = a.then(Operand::State(&a)).unwrap_err();
    assert!(matches!(err, CvError::InvalidOperand { .. }));
    assert_eq!(err.to_string(), "Cannot apply State to State");
}

#[test]
fn test_projection_onto_unknown_mode() {
    let a = coherent(0.1, 0.0).relabeled(vec![4]).unwrap();
    let b = coherent(0.1, 0.0);
    assert!(matches!(a.primal(Operand::State(&b)), Err(CvError::InvalidMode { mode: 4, .. })));
}

// ============================================================================
// Fock arithmetic
// ============================================================================

#[test]
fn test_mix_reports_fock_conversion() {
    let ctx = Context::default();
    let (mixed, advisory) = coherent(0.3, 0.0).mix(&preparations::vacuum(&ctx, 1).unwrap()).unwrap();
    assert!(matches!(advisory, Some(Advisory::FockConversion { operation: "mix", .. })));
    assert!(!mixed.is_gaussian());
    assert!(mixed.norm() > 1.9);

    let one = preparations::fock(&ctx, &[1], None).unwrap();
    let (_, advisory) = one.mix(&one).unwrap();
    assert!(advisory.is_none());
}

#[test]
fn test_scale_and_divide() {
    let ctx = Context::default();
    let one = preparations::fock(&ctx, &[1], None).unwrap();
    let (scaled, advisory) = one.scale(2.0).unwrap();
    assert!(advisory.is_none());
    assert_relative_eq!(scaled.norm(), 4.0, epsilon = TOL);

    let (halved, _) = scaled.divide(2.0).unwrap();
    assert_relative_eq!(halved.norm(), 1.0, epsilon = TOL);
    assert!(one.divide(0.0).is_err());

    let (_, advisory) = coherent(0.2, 0.0).scale(0.5).unwrap();
    assert!(advisory.is_some());
}
