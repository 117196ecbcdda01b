//! Configuration for the layout engine

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Which pipeline the engine runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Force simulation, collision resolution, grid snap and canvas fit
    #[default]
    Heuristic,
    /// Exact constraint solving; may report unsatisfiable or timeout
    Exact,
}

/// Constants of the force simulation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    pub k_repulsion: f64,
    pub k_attraction: f64,
    pub k_center: f64,
    /// Velocity decay per iteration, strictly between 0 and 1
    pub damping: f64,
    pub iterations: usize,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            k_repulsion: 5000.0,
            k_attraction: 0.01,
            k_center: 0.01,
            damping: 0.85,
            iterations: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    pub max_iterations: usize,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self { max_iterations: 10 }
    }
}

/// Post-processing of the heuristic pipeline
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Space kept around the content when the canvas grows
    pub margin: f64,
    pub snap_to_grid: bool,
    pub center: bool,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            margin: 100.0,
            snap_to_grid: true,
            center: true,
        }
    }
}

/// Exact solver limits
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExactConfig {
    /// Above this many constraints, low priority ones are dropped
    pub constraint_budget: usize,
    pub timeout_ms: u64,
    /// Forbid overlap between every pair of objects, not only listed ones
    pub global_no_overlap: bool,
    /// How many times a distance wedge may be bisected
    pub distance_refinement_depth: usize,
}

impl Default for ExactConfig {
    fn default() -> Self {
        Self {
            constraint_budget: 20,
            timeout_ms: 30_000,
            global_no_overlap: true,
            distance_refinement_depth: 3,
        }
    }
}

impl ExactConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Clearance kept between wires and obstacles
    pub padding: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { padding: 5.0 }
    }
}

/// Configuration options for layout computation
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub strategy: StrategyKind,
    pub force: ForceConfig,
    pub collision: CollisionConfig,
    pub canvas: CanvasConfig,
    pub exact: ExactConfig,
    pub routing: RoutingConfig,
}

impl LayoutConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string; missing keys keep defaults
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: LayoutConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Select the pipeline
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the number of force simulation iterations
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.force.iterations = iterations;
        self
    }

    /// Set the constraint count above which low priority constraints are pruned
    pub fn with_constraint_budget(mut self, budget: usize) -> Self {
        self.exact.constraint_budget = budget;
        self
    }

    /// Set the exact solver timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.exact.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the canvas margin used when growing the canvas
    pub fn with_canvas_margin(mut self, margin: f64) -> Self {
        self.canvas.margin = margin;
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = &self.force;
        if !(f.damping > 0.0 && f.damping < 1.0) {
            return Err(ConfigError::invalid(
                "force.damping",
                format!("must be strictly between 0 and 1, got {}", f.damping),
            ));
        }
        if f.iterations == 0 {
            return Err(ConfigError::invalid("force.iterations", "must be at least 1"));
        }
        for (field, value) in [
            ("force.k_repulsion", f.k_repulsion),
            ("force.k_attraction", f.k_attraction),
            ("force.k_center", f.k_center),
            ("canvas.margin", self.canvas.margin),
            ("routing.padding", self.routing.padding),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(
                    field,
                    format!("must be a finite non-negative number, got {}", value),
                ));
            }
        }
        if self.collision.max_iterations == 0 {
            return Err(ConfigError::invalid(
                "collision.max_iterations",
                "must be at least 1",
            ));
        }
        if self.exact.timeout_ms == 0 {
            return Err(ConfigError::invalid("exact.timeout_ms", "must be positive"));
        }
        Ok(())
    }
}
