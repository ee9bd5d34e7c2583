//! Tile stage model, stage file parsing and loading

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

/// Stage used when the page URL names none
pub const DEFAULT_STAGE_KEY: &str = "GEN-01";
/// World units per grid cell unless the stage file overrides it
pub const DEFAULT_TILE_SIZE: f32 = 80.0;
/// Open-world size used while no stage is loaded
pub const DEFAULT_WORLD_WIDTH: f32 = 2400.0;
pub const DEFAULT_WORLD_HEIGHT: f32 = 1800.0;
/// Trigger radius for events that do not declare one
pub const DEFAULT_EVENT_RADIUS: f32 = 120.0;

/// Terrain symbol of a single grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    /// `#` - blocks movement, bullets and vision
    Wall,
    /// `~` - deals continuous damage; also what lies beyond the grid edge
    Hazard,
    /// `,` - decorative ground variant
    Ground,
    /// `S` - player spawn
    Spawn,
    /// anything else
    Floor,
}

impl Tile {
    pub fn from_symbol(symbol: char) -> Self {
        match symbol {
            '#' => Self::Wall,
            '~' => Self::Hazard,
            ',' => Self::Ground,
            'S' => Self::Spawn,
            _ => Self::Floor,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Self::Wall => '#',
            Self::Hazard => '~',
            Self::Ground => ',',
            Self::Spawn => 'S',
            Self::Floor => '.',
        }
    }
}

/// Scripted proximity trigger placed on the stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageEvent {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub radius: f32,
    pub x: f32,
    pub y: f32,
    /// Latched once the player enters the radius; never reset
    pub triggered: bool,
}

#[derive(Debug, Deserialize)]
struct StageFile {
    tiles: Vec<String>,
    #[serde(default, rename = "tileSize")]
    tile_size: Option<f32>,
    #[serde(default)]
    events: Vec<EventFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventFile {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    radius: Option<f32>,
    tile_x: Option<f32>,
    tile_y: Option<f32>,
    x: Option<f32>,
    y: Option<f32>,
}

/// Stage loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("stage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stage request returned status {0}")]
    Status(u16),

    #[error("malformed stage file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("stage row {row} has {found} columns, expected {expected}")]
    Ragged {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("invalid stage key: {0:?}")]
    InvalidKey(String),

    #[error("failed to read stage file: {0}")]
    Io(#[from] std::io::Error),
}

/// Immutable-per-session tile grid plus its events
#[derive(Debug, Clone)]
pub struct Stage {
    tiles: Vec<Vec<Tile>>,
    tile_size: f32,
    events: Vec<StageEvent>,
    width: f32,
    height: f32,
}

impl Default for Stage {
    fn default() -> Self {
        Self::empty()
    }
}

impl Stage {
    /// Open world with no terrain; used until (or instead of) a loaded stage
    pub fn empty() -> Self {
        Self {
            tiles: Vec::new(),
            tile_size: DEFAULT_TILE_SIZE,
            events: Vec::new(),
            width: DEFAULT_WORLD_WIDTH,
            height: DEFAULT_WORLD_HEIGHT,
        }
    }

    /// Build a stage from tile rows. Rows must all have the same length.
    pub fn from_rows<S: AsRef<str>>(rows: &[S], tile_size: f32) -> Result<Self, StageError> {
        let tiles: Vec<Vec<Tile>> = rows
            .iter()
            .map(|row| row.as_ref().chars().map(Tile::from_symbol).collect())
            .collect();

        let expected = tiles.first().map(Vec::len).unwrap_or(0);
        if let Some((row, found)) = tiles
            .iter()
            .map(Vec::len)
            .enumerate()
            .find(|(_, len)| *len != expected)
        {
            return Err(StageError::Ragged {
                row,
                found,
                expected,
            });
        }

        if expected == 0 {
            return Ok(Self {
                tile_size,
                ..Self::empty()
            });
        }

        Ok(Self {
            width: expected as f32 * tile_size,
            height: tiles.len() as f32 * tile_size,
            tiles,
            tile_size,
            events: Vec::new(),
        })
    }

    /// Parse a stage file (`tiles`, optional `tileSize`, optional `events`)
    pub fn from_json(text: &str) -> Result<Self, StageError> {
        let file: StageFile = serde_json::from_str(text)?;
        let tile_size = file
            .tile_size
            .filter(|size| size.is_finite() && *size > 0.0)
            .unwrap_or(DEFAULT_TILE_SIZE);

        let mut stage = Self::from_rows(file.tiles.as_slice(), tile_size)?;
        let to_world = |tile: f32| tile * tile_size + tile_size / 2.0;
        stage.events = file
            .events
            .into_iter()
            .map(|ev| StageEvent {
                id: ev.id.unwrap_or_else(|| "event".to_string()),
                kind: ev.kind.unwrap_or_else(|| "event".to_string()),
                title: ev.title.unwrap_or_default(),
                radius: ev
                    .radius
                    .filter(|r| *r > 0.0)
                    .unwrap_or(DEFAULT_EVENT_RADIUS),
                x: ev.tile_x.map(to_world).or(ev.x).unwrap_or(0.0),
                y: ev.tile_y.map(to_world).or(ev.y).unwrap_or(0.0),
                triggered: false,
            })
            .collect();
        Ok(stage)
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn rows(&self) -> usize {
        self.tiles.len()
    }

    pub fn cols(&self) -> usize {
        self.tiles.first().map(Vec::len).unwrap_or(0)
    }

    /// World extent in world units
    pub fn world_size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    pub fn events(&self) -> &[StageEvent] {
        &self.events
    }

    /// Grid cell containing a world point, or `None` off the grid
    fn cell(&self, wx: f32, wy: f32) -> Option<Tile> {
        let col = (wx / self.tile_size).floor();
        let row = (wy / self.tile_size).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        self.tiles
            .get(row as usize)
            .and_then(|cells| cells.get(col as usize))
            .copied()
    }

    /// Solid terrain test. Everything off the grid is solid; an empty stage is open.
    pub fn is_wall(&self, wx: f32, wy: f32) -> bool {
        if self.is_empty() {
            return false;
        }
        self.cell(wx, wy).map_or(true, |tile| tile == Tile::Wall)
    }

    /// Terrain under a world point. Off the grid reads as hazard.
    pub fn tile_at(&self, wx: f32, wy: f32) -> Tile {
        if self.is_empty() {
            return Tile::Floor;
        }
        self.cell(wx, wy).unwrap_or(Tile::Hazard)
    }

    /// Center of the first spawn cell in row-major order, else the world center
    pub fn find_spawn(&self) -> (f32, f32) {
        let t = self.tile_size;
        self.tiles
            .iter()
            .enumerate()
            .find_map(|(row, cells)| {
                cells
                    .iter()
                    .position(|tile| *tile == Tile::Spawn)
                    .map(|col| (col as f32 * t + t / 2.0, row as f32 * t + t / 2.0))
            })
            .unwrap_or((self.width / 2.0, self.height / 2.0))
    }

    /// Latch every untriggered event whose radius contains the point.
    /// Returns the ids that fired on this call.
    pub fn trigger_events(&mut self, x: f32, y: f32) -> Vec<String> {
        let mut fired = Vec::new();
        for ev in self.events.iter_mut().filter(|ev| !ev.triggered) {
            if (x - ev.x).hypot(y - ev.y) <= ev.radius {
                ev.triggered = true;
                info!(event_id = %ev.id, kind = %ev.kind, "Stage event triggered");
                fired.push(ev.id.clone());
            }
        }
        fired
    }
}

/// Stage keys are file stems: letters, digits, `-` and `_`
pub fn is_valid_stage_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 32
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Read the `stage` parameter from a page query string (with or without `?`)
pub fn stage_key_from_query(query: &str) -> String {
    url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .find(|(name, _)| name == "stage")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_STAGE_KEY.to_string())
}

/// Read `{dir}/{key}.json` and check that it parses as a stage.
/// Returns the file text unchanged so it can be served as-is.
pub async fn read_stage_file(dir: &Path, key: &str) -> Result<String, StageError> {
    if !is_valid_stage_key(key) {
        return Err(StageError::InvalidKey(key.to_string()));
    }
    let text = tokio::fs::read_to_string(dir.join(format!("{key}.json"))).await?;
    Stage::from_json(&text)?;
    Ok(text)
}

/// Fetches stage files by key from `{base_url}/stages/{key}.json`
#[derive(Debug, Clone)]
pub struct StageLoader {
    client: reqwest::Client,
    base_url: String,
}

impl StageLoader {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch(&self, key: &str) -> Result<Stage, StageError> {
        if !is_valid_stage_key(key) {
            return Err(StageError::InvalidKey(key.to_string()));
        }

        let url = format!("{}/stages/{}.json", self.base_url, key);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(StageError::Status(response.status().as_u16()));
        }

        let text = response.text().await?;
        Stage::from_json(&text)
    }

    /// Load a stage, degrading any failure to the empty open world
    pub async fn load_or_empty(&self, key: &str) -> Stage {
        match self.fetch(key).await {
            Ok(stage) => {
                info!(
                    stage = %key,
                    rows = stage.rows(),
                    cols = stage.cols(),
                    events = stage.events().len(),
                    "Stage loaded"
                );
                stage
            }
            Err(e) => {
                warn!(stage = %key, error = %e, "Stage load failed, using empty stage");
                Stage::empty()
            }
        }
    }
}
