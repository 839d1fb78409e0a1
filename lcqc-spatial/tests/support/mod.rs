//! Shared fixtures for lcqc-spatial integration tests.

// Each test crate uses a different subset of the helpers.
#![allow(dead_code)]

pub mod span_capture;

use geo_types::{polygon, Coord, LineString, Polygon};
use lcqc_spatial::{
    BBox, BoundaryLayer, BoundaryUnit, EngineConfig, Feature, FeatureLayer, Workspace,
};

pub const SRID: u32 = 3035;

pub fn rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Polygon<f64> {
    BBox::new(x1, y1, x2, y2).to_polygon()
}

/// Regular polygon with `n` vertices around `(cx, cy)`.
pub fn ngon(cx: f64, cy: f64, radius: f64, n: usize) -> Polygon<f64> {
    let coords: Vec<Coord<f64>> = (0..n)
        .map(|i| {
            let angle = std::f64::consts::TAU * i as f64 / n as f64;
            Coord {
                x: cx + radius * angle.cos(),
                y: cy + radius * angle.sin(),
            }
        })
        .collect();
    Polygon::new(LineString::from(coords), vec![])
}

/// `cols` x `rows` grid of unit squares, fids row-major from 1.
pub fn grid_layer(name: &str, cols: usize, rows: usize) -> FeatureLayer {
    let mut layer = FeatureLayer::new(name, SRID);
    for row in 0..rows {
        for col in 0..cols {
            let fid = (row * cols + col + 1) as i64;
            let (x, y) = (col as f64, row as f64);
            layer = layer.with_feature(Feature::new(fid, rect(x, y, x + 1.0, y + 1.0)));
        }
    }
    layer
}

/// R1..R5 strip: R1 overlaps R2, R2 touches R3, R4 touches R5.
pub fn strip_layer(name: &str) -> FeatureLayer {
    [
        (1, rect(0.0, 0.0, 1.1, 1.0)),
        (2, rect(1.0, 0.0, 2.0, 1.0)),
        (3, rect(2.0, 0.0, 3.0, 1.0)),
        (4, rect(4.0, 0.0, 5.0, 1.0)),
        (5, rect(5.0, 0.0, 6.0, 1.0)),
    ]
    .into_iter()
    .fold(FeatureLayer::new(name, SRID), |layer, (fid, geom)| {
        layer.with_feature(Feature::new(fid, geom))
    })
}

/// Features 1-7 form a chain of unit squares; 8 stands alone.
pub fn chain_layer(name: &str) -> FeatureLayer {
    [
        (1, "A", "A", 1.0),
        (2, "A", "B", 2.0),
        (3, "A", "C", 4.0),
        (4, "A", "D", 8.0),
        (5, "B", "D", 16.0),
        (6, "C", "D", 32.0),
        (7, "D", "D", 64.0),
        (8, "A", "D", 128.0),
    ]
    .into_iter()
    .fold(FeatureLayer::new(name, SRID), |layer, (fid, c1, c2, area)| {
        let x = if fid == 8 { 20.0 } else { fid as f64 };
        layer.with_feature(
            Feature::new(fid, rect(x, 0.0, x + 1.0, 1.0))
                .with_attr("code1", c1)
                .with_attr("code2", c2)
                .with_attr("area", area),
        )
    })
}

/// Covers (0,0)-(10,10) except (7,5)-(10,10).
pub fn partial_cover_layer(name: &str) -> FeatureLayer {
    FeatureLayer::new(name, SRID)
        .with_feature(Feature::new(1, rect(0.0, 0.0, 10.0, 5.0)).with_attr("du", "A"))
        .with_feature(Feature::new(2, rect(0.0, 5.0, 6.0, 10.0)).with_attr("du", "A"))
        .with_feature(Feature::new(3, rect(6.0, 5.0, 7.0, 10.0)).with_attr("du", "A"))
}

/// `n` x `n` cells of side 1.37 from (0.113, 0.271), each cut along its
/// rising diagonal. Cell `k` (row-major) holds the lower-right triangle
/// `2k + 1` and the upper-left triangle `2k + 2`. No vertex lies on the
/// unit grid.
pub fn triangle_tiling(name: &str, n: usize) -> FeatureLayer {
    let xs: Vec<f64> = (0..=n).map(|k| 0.113 + 1.37 * k as f64).collect();
    let ys: Vec<f64> = (0..=n).map(|k| 0.271 + 1.37 * k as f64).collect();
    let mut layer = FeatureLayer::new(name, SRID);
    for j in 0..n {
        for i in 0..n {
            let k = (j * n + i) as i64;
            let (x0, x1, y0, y1) = (xs[i], xs[i + 1], ys[j], ys[j + 1]);
            let lower = polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1)];
            let upper = polygon![(x: x0, y: y0), (x: x1, y: y1), (x: x0, y: y1)];
            layer = layer
                .with_feature(Feature::new(2 * k + 1, lower))
                .with_feature(Feature::new(2 * k + 2, upper));
        }
    }
    layer
}

/// The square covered by [`triangle_tiling`].
pub fn tiling_boundary(name: &str, n: usize) -> BoundaryLayer {
    let far = 1.37 * n as f64;
    BoundaryLayer::new(name, SRID)
        .with_unit(BoundaryUnit::new(rect(0.113, 0.271, 0.113 + far, 0.271 + far)))
}

pub fn square_boundary(name: &str) -> BoundaryLayer {
    BoundaryLayer::new(name, SRID)
        .with_unit(BoundaryUnit::new(rect(0.0, 0.0, 10.0, 10.0)).with_attr("du", "A"))
}

/// Workspace with the given layers registered.
pub fn workspace(config: EngineConfig, layers: Vec<FeatureLayer>) -> Workspace {
    let mut ws = Workspace::new("it-job", config).unwrap();
    for layer in layers {
        ws.register_layer(layer).unwrap();
    }
    ws
}
