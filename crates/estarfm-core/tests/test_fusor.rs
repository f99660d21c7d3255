mod common;

use std::sync::Arc;

use approx::assert_relative_eq;

use common::{mask, mono, options, pattern, registry, typed, DATE1, DATE2, HIGH, LOW};
use estarfm_core::error::FusionError;
use estarfm_core::image::{Image, MultiResImages, PixelType, Rect, Size};
use estarfm_core::predictor::temporal_weights;
use estarfm_core::EstarfmFusor;

fn fusor_with(images: Arc<MultiResImages>, window_size: usize) -> EstarfmFusor {
    let mut fusor = EstarfmFusor::new();
    fusor.set_src_images(images);
    fusor.set_options(options(window_size)).unwrap();
    fusor
}

fn out_f64(fusor: &EstarfmFusor, x: usize, y: usize, c: usize) -> f64 {
    fusor.output_image().unwrap().get_f64(x, y, c)
}

fn varied_registry(width: usize, height: usize) -> Arc<MultiResImages> {
    registry(
        mono(width, height, |x, y| 100.0 + pattern(x, y, 0, 1)),
        mono(width, height, |x, y| 110.0 + pattern(x, y, 0, 2)),
        mono(width, height, |x, y| 50.0 + pattern(x, y, 0, 3) / 2.0),
        mono(width, height, |x, y| 55.0 + pattern(x, y, 0, 4) / 2.0),
        mono(width, height, |x, y| 60.0 + pattern(x, y, 0, 5) / 2.0),
    )
}

/// High resolution identical at both dates, low resolution unchanged over
/// time: every written pixel predicts to its high resolution value.
fn static_registry(width: usize, height: usize, channels: usize) -> (Arc<MultiResImages>, Image) {
    let high = Image::from_fn(width, height, channels, |x, y, c| 10.0 + pattern(x, y, c, 0));
    let low = Image::from_fn(width, height, channels, |x, y, c| 3.0 + pattern(x, y, c, 9) / 4.0);
    let images = registry(high.clone(), high.clone(), low.clone(), low.clone(), low);
    (images, high)
}

/// High resolution exactly `2 * low + 3` at both dates, with uniform low
/// resolution changes: low3 = low1 + 10, low2 = low1 + 13.
///
/// Every full 5x5 window has 13 similar pixels and a perfect fit with slope
/// 2, and the temporal weights are 3/16 and 13/16. A pixel therefore
/// predicts to `high1 + 16.25 + 4.875 * b` for regression coefficient `b`.
fn linear_registry() -> Arc<MultiResImages> {
    let low1 = |x: usize, y: usize| (x + y) as f64;
    registry(
        mono(9, 9, |x, y| 2.0 * low1(x, y) + 3.0),
        mono(9, 9, |x, y| 2.0 * (low1(x, y) + 10.0) + 3.0),
        mono(9, 9, low1),
        mono(9, 9, |x, y| low1(x, y) + 13.0),
        mono(9, 9, |x, y| low1(x, y) + 10.0),
    )
}

fn linear_expected(x: usize, y: usize, b: f64) -> f64 {
    2.0 * (x + y) as f64 + 3.0 + 16.25 + 4.875 * b
}

/// Pixels whose 5x5 window lies fully inside the 9x9 image.
fn interior() -> impl Iterator<Item = (usize, usize)> {
    (2..7).flat_map(|y| (2..7).map(move |x| (x, y)))
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_unchanged_scene_reproduces_high_resolution() {
    let (images, high) = static_registry(5, 5, 1);
    let mut fusor = fusor_with(images, 3);

    fusor.predict(DATE2, None, None).unwrap();

    let out = fusor.output_image().unwrap();
    assert_eq!(out.size(), Size::new(5, 5));
    assert_eq!(out.pixel_type(), PixelType::F64);
    for y in 0..5 {
        for x in 0..5 {
            assert_relative_eq!(out.get_f64(x, y, 0), high.get_f64(x, y, 0), epsilon = 1e-9);
        }
    }
}

#[test]
fn test_unchanged_scene_multi_channel() {
    let (images, high) = static_registry(6, 4, 3);
    let mut fusor = fusor_with(images, 3);

    fusor.predict(DATE2, None, None).unwrap();

    for y in 0..4 {
        for x in 0..6 {
            for c in 0..3 {
                assert_relative_eq!(out_f64(&fusor, x, y, c), high.get_f64(x, y, c), epsilon = 1e-9);
            }
        }
    }
}

#[test]
fn test_invalid_center_pixel_is_not_written() {
    let (images, high) = static_registry(5, 5, 1);
    let valid = mask(5, 5, |x, y| !(x == 2 && y == 2));
    let mut fusor = fusor_with(images, 3);

    fusor.predict(DATE2, Some(&valid), None).unwrap();

    // freshly allocated output is zero-filled, so an untouched pixel reads 0
    assert_eq!(out_f64(&fusor, 2, 2, 0), 0.0);
    for y in 0..5 {
        for x in 0..5 {
            if (x, y) != (2, 2) {
                assert_relative_eq!(out_f64(&fusor, x, y, 0), high.get_f64(x, y, 0), epsilon = 1e-9);
            }
        }
    }
}

#[test]
fn test_sparse_candidates_blend_center_values() {
    let (w, h) = (10, 10);
    // at most one valid pixel per 3x3 window
    let valid_at = |x: usize, y: usize| x % 3 == 0 && y % 3 == 0;
    let h1 = |x: usize, y: usize| 100.0 + pattern(x, y, 0, 1);
    let h3 = |x: usize, y: usize| 200.0 + pattern(x, y, 0, 2);
    let l1 = |x: usize, y: usize| 10.0 + pattern(x, y, 0, 3);
    let l2 = |x: usize, y: usize| 20.0 + pattern(x, y, 0, 4);
    let l3 = |x: usize, y: usize| 40.0 + pattern(x, y, 0, 5);
    let images = registry(
        mono(w, h, h1),
        mono(w, h, h3),
        mono(w, h, l1),
        mono(w, h, l2),
        mono(w, h, l3),
    );
    let valid = mask(w, h, valid_at);
    let mut fusor = fusor_with(images, 3);

    fusor.predict(DATE2, Some(&valid), None).unwrap();

    for y in 0..h {
        for x in 0..w {
            if !valid_at(x, y) {
                continue;
            }
            // the window sums only contain the center itself
            let (t1, t3) = temporal_weights(l1(x, y), l2(x, y), l3(x, y));
            let expected = t1 * h1(x, y) + t3 * h3(x, y);
            assert_eq!(out_f64(&fusor, x, y, 0), expected, "pixel ({x}, {y})");
        }
    }
}

#[test]
fn test_predict_is_idempotent() {
    let images = varied_registry(9, 7);
    let opts = options(5).with_local_tolerance(true);

    let mut a = EstarfmFusor::new();
    a.set_src_images(images.clone());
    a.set_options(opts.clone()).unwrap();
    a.predict(DATE2, None, None).unwrap();

    let mut b = EstarfmFusor::new();
    b.set_src_images(images);
    b.set_options(opts).unwrap();
    b.predict(DATE2, None, None).unwrap();
    let first = b.output_image().unwrap().as_array::<f64>().unwrap().clone();
    b.predict(DATE2, None, None).unwrap();

    let out_a = a.output_image().unwrap().as_array::<f64>().unwrap();
    let out_b = b.output_image().unwrap().as_array::<f64>().unwrap();
    assert_eq!(out_a, out_b);
    assert_eq!(&first, out_b);
}

#[test]
fn test_prediction_area_matches_full_prediction() {
    let (w, h) = (11, 9);
    let images = registry(
        typed::<u16>(w, h, 2, |x, y, c| 1000.0 + 10.0 * pattern(x, y, c, 1)),
        typed::<u16>(w, h, 2, |x, y, c| 1200.0 + 10.0 * pattern(x, y, c, 2)),
        typed::<i16>(w, h, 2, |x, y, c| 300.0 + pattern(x, y, c, 3)),
        typed::<i16>(w, h, 2, |x, y, c| 320.0 + pattern(x, y, c, 4)),
        typed::<i16>(w, h, 2, |x, y, c| 350.0 + pattern(x, y, c, 5)),
    );
    let mut full = fusor_with(images.clone(), 5);
    full.predict(DATE2, None, None).unwrap();

    let area = Rect::new(3, 2, 5, 4);
    let mut part = EstarfmFusor::new();
    part.set_src_images(images);
    part.set_options(options(5).with_prediction_area(area)).unwrap();
    part.predict(DATE2, None, None).unwrap();

    let part_out = part.output_image().unwrap();
    assert_eq!(part_out.size(), Size::new(5, 4));
    assert_eq!(part_out.pixel_type(), PixelType::U16);
    let full_out = full.output_image().unwrap().as_array::<u16>().unwrap();
    let part_arr = part_out.as_array::<u16>().unwrap();
    for y in 0..4 {
        for x in 0..5 {
            for c in 0..2 {
                assert_eq!(part_arr[[y, x, c]], full_out[[y + 2, x + 3, c]]);
            }
        }
    }
}

#[test]
fn test_prediction_mask_limits_written_pixels() {
    let (images, high) = static_registry(6, 6, 1);
    let selected = mask(6, 6, |x, _| x < 3);
    let mut fusor = fusor_with(images, 3);

    fusor.predict(DATE2, None, Some(&selected)).unwrap();

    for y in 0..6 {
        for x in 0..6 {
            let v = out_f64(&fusor, x, y, 0);
            if x < 3 {
                assert_relative_eq!(v, high.get_f64(x, y, 0), epsilon = 1e-9);
            } else {
                assert_eq!(v, 0.0);
            }
        }
    }
}

#[test]
fn test_data_range_falls_back_to_weighted_high_average() {
    let (w, h) = (7, 7);
    let images = registry(
        mono(w, h, |_, _| 95.0),
        mono(w, h, |_, _| 95.0),
        mono(w, h, |x, _| 10.0 + x as f64),
        mono(w, h, |x, _| 60.0 + x as f64),
        mono(w, h, |x, _| 10.0 + x as f64),
    );

    let mut unbounded = fusor_with(images.clone(), 5);
    unbounded.predict(DATE2, None, None).unwrap();
    assert_relative_eq!(out_f64(&unbounded, 3, 3, 0), 145.0, epsilon = 1e-6);

    let mut bounded = EstarfmFusor::new();
    bounded.set_src_images(images);
    bounded
        .set_options(options(5).with_data_range(0.0, 100.0))
        .unwrap();
    bounded.predict(DATE2, None, None).unwrap();
    for y in 0..h {
        for x in 0..w {
            assert_relative_eq!(out_f64(&bounded, x, y, 0), 95.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_regression_slope_scales_low_resolution_change() {
    let mut fusor = fusor_with(linear_registry(), 5);
    fusor.predict(DATE2, None, None).unwrap();

    for (x, y) in interior() {
        let v = out_f64(&fusor, x, y, 0);
        assert_relative_eq!(v, linear_expected(x, y, 2.0), epsilon = 1e-6);
        // a slope of 1 would give 4.875 less
        assert!((v - linear_expected(x, y, 1.0)).abs() > 4.0);
    }
}

#[test]
fn test_quality_weighted_regression_keeps_perfect_fit() {
    let mut fusor = EstarfmFusor::new();
    fusor.set_src_images(linear_registry());
    fusor
        .set_options(options(5).with_quality_weighted_regression(true))
        .unwrap();
    fusor.predict(DATE2, None, None).unwrap();

    for (x, y) in interior() {
        assert_relative_eq!(out_f64(&fusor, x, y, 0), linear_expected(x, y, 2.0), epsilon = 1e-6);
    }
}

#[test]
fn test_low_resolution_spread_above_uncertainty_skips_regression() {
    let images = linear_registry();

    // spread of the candidate lows (about 5) exceeds 1000 * 0.002 * sqrt(2)
    let mut skipped = EstarfmFusor::new();
    skipped.set_src_images(images.clone());
    skipped
        .set_options(options(5).with_data_range(0.0, 1000.0))
        .unwrap();
    skipped.predict(DATE2, None, None).unwrap();

    // a large uncertainty lets the fit through again
    let mut fitted = EstarfmFusor::new();
    fitted.set_src_images(images);
    fitted
        .set_options(
            options(5)
                .with_data_range(0.0, 1000.0)
                .with_uncertainty_factor(1.0),
        )
        .unwrap();
    fitted.predict(DATE2, None, None).unwrap();

    for (x, y) in interior() {
        assert_relative_eq!(out_f64(&skipped, x, y, 0), linear_expected(x, y, 1.0), epsilon = 1e-6);
        assert_relative_eq!(out_f64(&fitted, x, y, 0), linear_expected(x, y, 2.0), epsilon = 1e-6);
    }
}

#[test]
fn test_integer_output_is_saturated() {
    let (w, h) = (5, 5);
    let images = registry(
        typed::<u8>(w, h, 1, |_, _, _| 250.0),
        typed::<u8>(w, h, 1, |_, _, _| 250.0),
        typed::<f32>(w, h, 1, |x, _, _| x as f64),
        typed::<f32>(w, h, 1, |x, _, _| 100.0 + x as f64),
        typed::<f32>(w, h, 1, |x, _, _| x as f64),
    );
    let mut fusor = fusor_with(images, 5);
    fusor.predict(DATE2, None, None).unwrap();

    let out = fusor.output_image().unwrap();
    assert_eq!(out.pixel_type(), PixelType::U8);
    assert!(out.as_array::<u8>().unwrap().iter().all(|&v| v == 255));
}

// ---------------------------------------------------------------------------
// Output buffer lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_output_buffer_is_reused() {
    let images = varied_registry(6, 5);
    let mut fusor = fusor_with(images, 3);
    fusor.predict(DATE2, None, None).unwrap();
    let ptr = fusor.output_image().unwrap().as_array::<f64>().unwrap().as_ptr();
    fusor.predict(DATE2, None, None).unwrap();
    let ptr_again = fusor.output_image().unwrap().as_array::<f64>().unwrap().as_ptr();
    assert_eq!(ptr, ptr_again);
}

#[test]
fn test_output_reallocated_for_new_area() {
    let images = varied_registry(6, 5);
    let mut fusor = fusor_with(images, 3);
    fusor.predict(DATE2, None, None).unwrap();
    fusor
        .set_options(options(3).with_prediction_area(Rect::new(1, 1, 2, 3)))
        .unwrap();
    fusor.predict(DATE2, None, None).unwrap();
    assert_eq!(fusor.output_image().unwrap().size(), Size::new(2, 3));
}

#[test]
fn test_failed_predict_keeps_previous_output() {
    let images = varied_registry(5, 5);
    let mut fusor = fusor_with(images, 3);
    fusor.predict(DATE2, None, None).unwrap();
    let before = fusor.output_image().unwrap().as_array::<f64>().unwrap().clone();

    let mut partial = MultiResImages::new();
    partial.set(HIGH, DATE1, mono(5, 5, |_, _| 1.0));
    fusor.set_src_images(Arc::new(partial));
    assert!(fusor.predict(DATE2, None, None).is_err());

    let after = fusor.output_image().unwrap().as_array::<f64>().unwrap();
    assert_eq!(&before, after);
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

#[test]
fn test_set_options_rejects_equal_dates() {
    let mut fusor = EstarfmFusor::new();
    let err = fusor.set_options(options(3).with_dates(4, 4)).unwrap_err();
    assert!(matches!(err, FusionError::InvalidArgument(_)));
}

#[test]
fn test_set_options_rejects_equal_tags() {
    let mut fusor = EstarfmFusor::new();
    fusor.set_options(options(3).with_tags("hr", "lr")).unwrap();
    let err = fusor
        .set_options(options(3).with_tags("same", "same"))
        .unwrap_err();
    assert!(matches!(err, FusionError::InvalidArgument(_)));
    // previous options stay in place
    assert_eq!(fusor.options().high_res_tag, "hr");
    assert_eq!(fusor.options().low_res_tag, "lr");
}

#[test]
fn test_predict_without_options_is_rejected() {
    let mut fusor = EstarfmFusor::new();
    fusor.set_src_images(varied_registry(4, 4));

    // default options have date1 == date3
    let err = fusor.predict(DATE2, None, None).unwrap_err();
    assert!(matches!(err, FusionError::InvalidArgument(_)));
    assert!(fusor.output_image().is_none());

    let err = fusor.resolve_prediction_area(DATE2, None, None).unwrap_err();
    assert!(matches!(err, FusionError::InvalidArgument(_)));
}

#[test]
fn test_predict_without_images_is_logic_error() {
    let mut fusor = EstarfmFusor::new();
    fusor.set_options(options(3)).unwrap();
    let err = fusor.predict(DATE2, None, None).unwrap_err();
    assert!(matches!(err, FusionError::Logic(_)));
}

#[test]
fn test_missing_images_are_enumerated() {
    let mut images = MultiResImages::new();
    images.set(HIGH, DATE1, mono(4, 4, |_, _| 1.0));
    images.set(LOW, DATE2, mono(4, 4, |_, _| 1.0));
    let mut fusor = fusor_with(Arc::new(images), 3);

    let err = fusor.predict(DATE2, None, None).unwrap_err();
    let FusionError::NotFound(msg) = err else {
        panic!("expected NotFound, got {err:?}");
    };
    assert!(msg.contains("'high' at date 3"), "{msg}");
    assert!(msg.contains("'low' at date 1"), "{msg}");
    assert!(msg.contains("'low' at date 3"), "{msg}");
    assert!(!msg.contains("'high' at date 1"), "{msg}");
    assert!(!msg.contains("'low' at date 2"), "{msg}");
}

#[test]
fn test_high_type_mismatch() {
    let images = registry(
        typed::<u16>(4, 4, 1, |_, _, _| 1.0),
        typed::<f32>(4, 4, 1, |_, _, _| 1.0),
        mono(4, 4, |_, _| 1.0),
        mono(4, 4, |_, _| 1.0),
        mono(4, 4, |_, _| 1.0),
    );
    let err = fusor_with(images, 3).predict(DATE2, None, None).unwrap_err();
    assert!(matches!(err, FusionError::ImageType(_)));
}

#[test]
fn test_low_type_mismatch() {
    let images = registry(
        mono(4, 4, |_, _| 1.0),
        mono(4, 4, |_, _| 1.0),
        typed::<i16>(4, 4, 1, |_, _, _| 1.0),
        typed::<i16>(4, 4, 1, |_, _, _| 1.0),
        typed::<i32>(4, 4, 1, |_, _, _| 1.0),
    );
    let err = fusor_with(images, 3).predict(DATE2, None, None).unwrap_err();
    assert!(matches!(err, FusionError::ImageType(_)));
}

#[test]
fn test_mixed_high_low_types_are_allowed() {
    let images = registry(
        typed::<i16>(4, 4, 1, |x, _, _| x as f64),
        typed::<i16>(4, 4, 1, |x, _, _| x as f64),
        typed::<f32>(4, 4, 1, |_, y, _| y as f64),
        typed::<f32>(4, 4, 1, |_, y, _| y as f64),
        typed::<f32>(4, 4, 1, |_, y, _| y as f64),
    );
    let mut fusor = fusor_with(images, 3);
    fusor.predict(DATE2, None, None).unwrap();
    assert_eq!(fusor.output_image().unwrap().pixel_type(), PixelType::I16);
}

#[test]
fn test_channel_count_mismatch() {
    let images = registry(
        Image::from_fn(4, 4, 2, |_, _, _| 1.0f64),
        Image::from_fn(4, 4, 2, |_, _, _| 1.0f64),
        mono(4, 4, |_, _| 1.0),
        mono(4, 4, |_, _| 1.0),
        mono(4, 4, |_, _| 1.0),
    );
    let err = fusor_with(images, 3).predict(DATE2, None, None).unwrap_err();
    assert!(matches!(err, FusionError::ImageType(_)));
}

#[test]
fn test_size_mismatch() {
    let images = registry(
        mono(4, 4, |_, _| 1.0),
        mono(4, 4, |_, _| 1.0),
        mono(4, 4, |_, _| 1.0),
        mono(4, 5, |_, _| 1.0),
        mono(4, 4, |_, _| 1.0),
    );
    let err = fusor_with(images, 3).predict(DATE2, None, None).unwrap_err();
    assert!(matches!(err, FusionError::Size(_)));
}

#[test]
fn test_mask_must_be_u8() {
    let images = varied_registry(4, 4);
    let bad = typed::<u16>(4, 4, 1, |_, _, _| 1.0);
    let err = fusor_with(images, 3)
        .predict(DATE2, Some(&bad), None)
        .unwrap_err();
    assert!(matches!(err, FusionError::ImageType(_)));
}

#[test]
fn test_mask_channel_count_must_fit() {
    let (images, high) = static_registry(4, 4, 2);
    let bad = Image::from_fn(4, 4, 3, |_, _, _| 1u8);
    let err = fusor_with(images.clone(), 3)
        .predict(DATE2, None, Some(&bad))
        .unwrap_err();
    assert!(matches!(err, FusionError::ImageType(_)));

    let per_channel = Image::from_fn(4, 4, 2, |_, _, c| c as u8);
    let mut fusor = fusor_with(images, 3);
    fusor.predict(DATE2, Some(&per_channel), None).unwrap();
    // channel 0 invalid everywhere, channel 1 predicted
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(out_f64(&fusor, x, y, 0), 0.0);
            assert_relative_eq!(out_f64(&fusor, x, y, 1), high.get_f64(x, y, 1), epsilon = 1e-9);
        }
    }
}

#[test]
fn test_mask_size_must_match() {
    let images = varied_registry(4, 4);
    let bad = mask(5, 4, |_, _| true);
    let err = fusor_with(images, 3)
        .predict(DATE2, Some(&bad), None)
        .unwrap_err();
    assert!(matches!(err, FusionError::Size(_)));
}

#[test]
fn test_prediction_area_outside_image() {
    let images = varied_registry(4, 4);
    let mut fusor = EstarfmFusor::new();
    fusor.set_src_images(images);
    fusor
        .set_options(options(3).with_prediction_area(Rect::new(2, 2, 3, 3)))
        .unwrap();
    let err = fusor.predict(DATE2, None, None).unwrap_err();
    assert!(matches!(err, FusionError::Size(_)));
}

#[test]
fn test_resolve_prediction_area_defaults_to_full_image() {
    let images = varied_registry(7, 3);
    let fusor = fusor_with(images, 3);
    let area = fusor.resolve_prediction_area(DATE2, None, None).unwrap();
    assert_eq!(area, Rect::new(0, 0, 7, 3));
}
