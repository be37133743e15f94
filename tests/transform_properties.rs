use ndarray::Array2;
use proptest::prelude::*;
use splitnoise::{GridDescriptor, SpectralTransform, Wcs};

fn map_strategy() -> impl Strategy<Value = (f64, Array2<f64>)> {
    (1usize..9, 1usize..9, 0.1f64..2.0).prop_flat_map(|(ny, nx, pixel_deg)| {
        prop::collection::vec(-100.0f64..100.0, ny * nx).prop_map(move |values| {
            let map = Array2::from_shape_vec((ny, nx), values).unwrap();
            (pixel_deg, map)
        })
    })
}

proptest! {
    #[test]
    fn inverse_undoes_forward((pixel_deg, map) in map_strategy()) {
        let grid = GridDescriptor::new(map.dim(), Wcs::car(pixel_deg)).unwrap();
        let transform = SpectralTransform::new(&grid);
        let kmap = transform.forward(&map).unwrap();
        let back = transform.inverse_real(&kmap).unwrap();
        for (a, b) in map.iter().zip(back.iter()) {
            prop_assert!((a - b).abs() < 1e-8 * (1.0 + a.abs()));
        }
    }

    #[test]
    fn power_sums_to_area_weighted_variance((pixel_deg, map) in map_strategy()) {
        // sum over modes of |k|^2 equals the pixel area times sum of squares
        let grid = GridDescriptor::new(map.dim(), Wcs::car(pixel_deg)).unwrap();
        let transform = SpectralTransform::new(&grid);
        let kmap = transform.forward(&map).unwrap();
        let power: f64 = kmap.data().iter().map(|c| c.norm_sqr()).sum();
        let expected = grid.pixel_area() * map.iter().map(|v| v * v).sum::<f64>();
        prop_assert!((power - expected).abs() <= 1e-9 * (1.0 + expected));
    }
}
