//! Angle folding plus 16/8/4-point labels for the numeric heading display.

/// Fold any finite angle into [0, 360).
pub fn normalize_degrees(degrees: f64) -> f64 {
    let normalized = ((degrees % 360.0) + 360.0) % 360.0;
    // -1e-15 + 360.0 rounds to 360.0
    if normalized >= 360.0 { 0.0 } else { normalized }
}

/// Signed difference `to - from`, folded into [-180, 180).
pub fn shortest_delta(from: f64, to: f64) -> f64 {
    normalize_degrees(to - from + 180.0) - 180.0
}

/// Represents a 16-point compass rose.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Direction {
    N,   // north
    NNE, // north-northeast
    NE,  // northeast
    ENE, // east-northeast
    E,   // east
    ESE, // east-southeast
    SE,  // southeast
    SSE, // south-southeast
    S,   // south
    SSW, // south-southwest
    SW,  // southwest
    WSW, // west-southwest
    W,   // west
    WNW, // west-northwest
    NW,  // northwest
    NNW, // north-northwest
}

/// Clockwise from north, one entry per 22.5°.
const ROSE: [Direction; 16] = [
    Direction::N,
    Direction::NNE,
    Direction::NE,
    Direction::ENE,
    Direction::E,
    Direction::ESE,
    Direction::SE,
    Direction::SSE,
    Direction::S,
    Direction::SSW,
    Direction::SW,
    Direction::WSW,
    Direction::W,
    Direction::WNW,
    Direction::NW,
    Direction::NNW,
];

/// How finely a heading is labelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompassPoints {
    Four = 4,
    Eight = 8,
    Sixteen = 16,
}

impl TryFrom<u8> for CompassPoints {
    type Error = String;

    fn try_from(points: u8) -> Result<Self, Self::Error> {
        match points {
            4 => Ok(CompassPoints::Four),
            8 => Ok(CompassPoints::Eight),
            16 => Ok(CompassPoints::Sixteen),
            other => Err(format!("labels come in 4, 8 or 16 points, not {other}")),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::N => "north",
            Direction::NNE => "north-northeast",
            Direction::NE => "northeast",
            Direction::ENE => "east-northeast",
            Direction::E => "east",
            Direction::ESE => "east-southeast",
            Direction::SE => "southeast",
            Direction::SSE => "south-southeast",
            Direction::S => "south",
            Direction::SSW => "south-southwest",
            Direction::SW => "southwest",
            Direction::WSW => "west-southwest",
            Direction::W => "west",
            Direction::WNW => "west-northwest",
            Direction::NW => "northwest",
            Direction::NNW => "north-northwest",
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            Direction::N => "N",
            Direction::NNE => "NNE",
            Direction::NE => "NE",
            Direction::ENE => "ENE",
            Direction::E => "E",
            Direction::ESE => "ESE",
            Direction::SE => "SE",
            Direction::SSE => "SSE",
            Direction::S => "S",
            Direction::SSW => "SSW",
            Direction::SW => "SW",
            Direction::WSW => "WSW",
            Direction::W => "W",
            Direction::WNW => "WNW",
            Direction::NW => "NW",
            Direction::NNW => "NNW",
        }
    }
}

/// Label a heading with the nearest of `points` compass directions.
pub fn heading_to_direction(heading: f64, points: CompassPoints) -> Direction {
    let points = points as usize;
    let sector = 360.0 / points as f64;
    let index = ((normalize_degrees(heading) + sector / 2.0) / sector) as usize % points;
    ROSE[index * (16 / points)]
}
