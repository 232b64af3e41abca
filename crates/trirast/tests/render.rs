mod common;

use anyhow::Result;
use approx::assert_abs_diff_eq;
use trirast::{ArrayView, BufferCapacities, DepthPeeler, RasterError};

use common::{automatic, instance, ranged, RES, TRI, TRI_IDX};

#[test]
fn single_triangle_output_shapes() -> Result<()> {
    let Some(engine) = automatic(false) else { return Ok(()) };

    let out = engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, RES))?;
    assert_eq!(out.raster.shape(), [1, 64, 64, 4]);
    assert_eq!(out.derivatives.shape(), [1, 64, 64, 0]);
    assert!(out.derivatives.buffer().is_none());
    assert_eq!(out.raster.device_index(), engine.device_index());
    Ok(())
}

#[test]
fn range_mode_matches_instance_mode() -> Result<()> {
    let Some(engine) = automatic(false) else { return Ok(()) };

    let by_instance = engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, RES))?;
    let by_range = engine.render(&ranged(&engine, &TRI, &TRI_IDX, &[0, 3], RES))?;

    assert_eq!(by_instance.raster.shape(), by_range.raster.shape());
    assert_eq!(
        engine.read_to_host(&by_instance.raster)?,
        engine.read_to_host(&by_range.raster)?
    );
    Ok(())
}

#[test]
fn pixel_values_follow_clip_space() -> Result<()> {
    let Some(engine) = automatic(false) else { return Ok(()) };

    let out = engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, RES))?;
    let data = engine.read_to_host(&out.raster)?;
    let at = |row, col, ch| data[out.raster.offset(0, row, col, ch)];

    // Pixel center (40.5, 40.5) is clip (0.265625, 0.265625).
    assert_abs_diff_eq!(at(40, 40, 0), 0.46875, epsilon = 1e-4);
    assert_abs_diff_eq!(at(40, 40, 1), 0.265625, epsilon = 1e-4);
    assert_abs_diff_eq!(at(40, 40, 2), 0.0, epsilon = 1e-6);
    assert_eq!(at(40, 40, 3), 1.0);

    // Clip (-0.67, -0.67) is outside the triangle.
    for ch in 0..4 {
        assert_eq!(at(10, 10, ch), 0.0);
    }
    Ok(())
}

#[test]
fn derivatives_are_populated_when_enabled() -> Result<()> {
    let Some(engine) = automatic(true) else { return Ok(()) };

    let out = engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, RES))?;
    assert_eq!(out.derivatives.shape(), [1, 64, 64, 4]);

    let db = engine.read_to_host(&out.derivatives)?;
    let at = |ch| db[out.derivatives.offset(0, 40, 40, ch)];
    // One pixel spans 2/64 in clip space; u = 1 - x - y, v = x.
    assert_abs_diff_eq!(at(0), -0.03125, epsilon = 1e-4);
    assert_abs_diff_eq!(at(1), -0.03125, epsilon = 1e-4);
    assert_abs_diff_eq!(at(2), 0.03125, epsilon = 1e-4);
    assert_abs_diff_eq!(at(3), 0.0, epsilon = 1e-4);
    Ok(())
}

#[test]
fn depth_follows_instances_and_ranges() -> Result<()> {
    let Some(engine) = automatic(false) else { return Ok(()) };

    let three: Vec<f32> = TRI.iter().copied().cycle().take(TRI.len() * 3).collect();
    let out = engine.render(&instance(&engine, &three, 3, &TRI_IDX, RES))?;
    assert_eq!(out.raster.depth(), 3);

    let out = engine.render(&ranged(&engine, &three, &TRI_IDX, &[0, 3, 6, 3], RES))?;
    assert_eq!(out.raster.depth(), 2);
    Ok(())
}

#[test]
fn peeled_layers_never_get_nearer() -> Result<()> {
    let Some(engine) = automatic(false) else { return Ok(()) };

    // Two screen-covering triangles; the second is nearer.
    #[rustfmt::skip]
    let pos = [
        -1.0, -1.0,  0.2, 1.0,   3.0, -1.0,  0.2, 1.0,  -1.0,  3.0,  0.2, 1.0,
        -1.0, -1.0, -0.3, 1.0,   1.0, -1.0, -0.3, 1.0,  -1.0,  1.0, -0.3, 1.0,
    ];
    let tri = [0, 1, 2, 3, 4, 5];

    let mut peeler = DepthPeeler::new(&engine, instance(&engine, &pos, 1, &tri, RES));
    let layers: Vec<Vec<f32>> = (0..3)
        .map(|_| -> Result<Vec<f32>> {
            let out = peeler.rasterize_next_layer()?;
            Ok(engine.read_to_host(&out.raster)?)
        })
        .collect::<Result<_>>()?;
    assert_eq!(peeler.next_layer(), 3);

    for pair in layers.windows(2) {
        for (near, far) in pair[0].chunks_exact(4).zip(pair[1].chunks_exact(4)) {
            if near[3] != 0.0 && far[3] != 0.0 {
                assert!(far[2] >= near[2], "layer got nearer: {} < {}", far[2], near[2]);
            }
        }
    }

    // Pixel (10, 10) lies inside both triangles.
    let px = (10 * 64 + 10) * 4;
    assert_eq!(layers[0][px + 3], 2.0);
    assert_abs_diff_eq!(layers[0][px + 2], -0.3, epsilon = 1e-5);
    assert_eq!(layers[1][px + 3], 1.0);
    assert_abs_diff_eq!(layers[1][px + 2], 0.2, epsilon = 1e-5);
    assert_eq!(layers[2][px + 3], 0.0);
    Ok(())
}

#[test]
fn smaller_request_reuses_buffers() -> Result<()> {
    let Some(engine) = automatic(false) else { return Ok(()) };

    let two: Vec<f32> = TRI.iter().copied().cycle().take(TRI.len() * 2).collect();
    engine.render(&instance(&engine, &two, 2, &TRI_IDX, (128, 128)))?;
    let caps = engine.buffer_capacities();
    let reallocations = engine.reallocation_count();
    assert_eq!(reallocations, 1);

    engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, RES))?;
    assert_eq!(engine.reallocation_count(), reallocations);
    assert_eq!(engine.buffer_capacities(), caps);
    Ok(())
}

#[test]
fn device_mismatch_touches_no_buffers() -> Result<()> {
    let Some(engine) = automatic(false) else { return Ok(()) };

    let mut req = instance(&engine, &TRI, 1, &TRI_IDX, RES);
    req.positions = ArrayView::from_f32(&TRI, &[1, 3, 4]).on_device(engine.device_index() + 1);

    assert!(matches!(
        engine.render(&req),
        Err(RasterError::DeviceMismatch { input: "pos", .. })
    ));
    assert_eq!(engine.reallocation_count(), 0);
    assert_eq!(engine.buffer_capacities(), BufferCapacities::default());
    Ok(())
}

#[test]
fn out_of_bounds_range_touches_no_buffers() -> Result<()> {
    let Some(engine) = automatic(false) else { return Ok(()) };

    let err = engine.render(&ranged(&engine, &TRI, &TRI_IDX, &[1, 3], RES));
    assert!(matches!(err, Err(RasterError::InputValidation(_))));
    assert_eq!(engine.reallocation_count(), 0);
    assert_eq!(engine.buffer_capacities(), BufferCapacities::default());
    Ok(())
}

#[test]
fn zero_width_tensor_reads_empty() -> Result<()> {
    let Some(engine) = automatic(false) else { return Ok(()) };

    let out = engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, RES))?;
    assert!(engine.read_to_host(&out.derivatives)?.is_empty());
    Ok(())
}
