// Per-class display styles. A small fixed table covers the classes the
// effects care about; everything else gets a deterministic palette color so
// the same class always renders the same way across frames and runs.

use opencv::core::Scalar;

/// Display style for one object class: the BGR color used for labels, edge
/// recoloring and markers, plus the translucent box-fill color.
#[derive(Debug, Clone, Copy)]
pub struct ClassStyle {
    pub color: Scalar,
    pub fill: Scalar,
}

fn person_color() -> Scalar {
    Scalar::new(0.0, 255.0, 0.0, 0.0)
}

fn car_color() -> Scalar {
    Scalar::new(213.0, 160.0, 47.0, 0.0)
}

fn car_fill() -> Scalar {
    Scalar::new(255.0, 0.0, 255.0, 0.0)
}

// Fallback palette, indexed by class id. Distinct mid-saturation BGR tones.
const PALETTE: [(f64, f64, f64); 8] = [
    (66.0, 66.0, 229.0),
    (41.0, 156.0, 240.0),
    (45.0, 200.0, 255.0),
    (113.0, 204.0, 46.0),
    (182.0, 89.0, 155.0),
    (219.0, 152.0, 52.0),
    (173.0, 68.0, 142.0),
    (34.0, 126.0, 230.0),
];

/// Style for a class, by label first and palette fallback second.
pub fn style_for(class_id: usize, label: &str) -> ClassStyle {
    match label {
        "person" => ClassStyle {
            color: person_color(),
            fill: person_color(),
        },
        "car" => ClassStyle {
            color: car_color(),
            fill: car_fill(),
        },
        _ => {
            let (b, g, r) = PALETTE[class_id % PALETTE.len()];
            let color = Scalar::new(b, g, r, 0.0);
            ClassStyle { color, fill: color }
        }
    }
}
