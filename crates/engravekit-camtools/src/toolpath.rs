//! Toolpath compilation
//!
//! Turns extracted paths plus physical parameters into an ordered
//! command program for a GRBL-style laser controller. The compiler owns
//! all physical-unit conversion: vertices are scaled once and rounded to
//! three decimal places, which bounds both program size and numeric
//! drift across long boundaries.
//!
//! Ordering guarantees:
//! - every engrave move happens inside an open laser run
//! - every opened laser run is closed before the next rapid move or home
//! - the laser is toggled at most once per path

use crate::error::{CamToolError, CamToolResult};
use engravekit_core::{PathKind, Point, ScaleFactor, TracedPath};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One controller command in the fixed program vocabulary
///
/// Coordinates are physical units already rounded to three decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Select millimeter units (`G21`)
    SetUnits,
    /// Select absolute positioning (`G90`)
    SetAbsoluteMode,
    /// Set the rapid-move feed rate (`G0 F`)
    SetTravelRate(f64),
    /// Set the engrave-move feed rate (`G1 F`)
    SetEngraveRate(f64),
    /// Turn the laser off (`M5`)
    LaserOff,
    /// Move without firing (`G0`)
    RapidMoveTo {
        /// Target X in physical units
        x: f64,
        /// Target Y in physical units
        y: f64,
    },
    /// Fire the laser at the given power (`M3 S`)
    LaserOn {
        /// Laser power, 0-255
        power: u8,
    },
    /// Move while firing (`G1`)
    EngraveMoveTo {
        /// Target X in physical units
        x: f64,
        /// Target Y in physical units
        y: f64,
    },
    /// Home all axes (`$H`)
    Home,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetUnits => write!(f, "G21"),
            Command::SetAbsoluteMode => write!(f, "G90"),
            Command::SetTravelRate(rate) => write!(f, "G0 F{:.0}", rate),
            Command::SetEngraveRate(rate) => write!(f, "G1 F{:.0}", rate),
            Command::LaserOff => write!(f, "M5"),
            Command::RapidMoveTo { x, y } => write!(f, "G0 X{:.3} Y{:.3}", x, y),
            Command::LaserOn { power } => write!(f, "M3 S{}", power),
            Command::EngraveMoveTo { x, y } => write!(f, "G1 X{:.3} Y{:.3}", x, y),
            Command::Home => write!(f, "$H"),
        }
    }
}

/// An ordered, immutable command program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolpathProgram {
    commands: Vec<Command>,
}

impl ToolpathProgram {
    /// The program's commands in delivery order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of commands in the program
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the program has no commands
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Render the program as plain ASCII text, one newline-terminated
    /// command per line
    pub fn render(&self) -> String {
        let mut text = String::new();
        for command in &self.commands {
            text.push_str(&command.to_string());
            text.push('\n');
        }
        text
    }

    /// Estimate how long the controller will execute this program.
    ///
    /// Walks the motion commands tracking position and the modal feed
    /// rates; rates are in units/minute. Laser toggles and homing are
    /// counted as free.
    pub fn estimate_duration(&self) -> Duration {
        let mut travel_rate = 0.0f64;
        let mut engrave_rate = 0.0f64;
        let mut position = (0.0f64, 0.0f64);
        let mut minutes = 0.0f64;

        for command in &self.commands {
            match *command {
                Command::SetTravelRate(rate) => travel_rate = rate,
                Command::SetEngraveRate(rate) => engrave_rate = rate,
                Command::RapidMoveTo { x, y } | Command::EngraveMoveTo { x, y } => {
                    let rate = if matches!(*command, Command::RapidMoveTo { .. }) {
                        travel_rate
                    } else {
                        engrave_rate
                    };
                    let dist = (x - position.0).hypot(y - position.1);
                    if rate > 0.0 {
                        minutes += dist / rate;
                    }
                    position = (x, y);
                }
                _ => {}
            }
        }
        Duration::from_secs_f64(minutes * 60.0)
    }
}

/// Physical parameters for toolpath compilation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompilerParams {
    /// Laser power for engrave moves, 0-255
    pub laser_power: u8,
    /// Rapid-move feed rate in units/minute
    pub travel_rate: f64,
    /// Engrave-move feed rate in units/minute
    pub engrave_rate: f64,
}

impl Default for CompilerParams {
    fn default() -> Self {
        Self {
            laser_power: 255,
            travel_rate: 5000.0,
            engrave_rate: 1500.0,
        }
    }
}

/// Compile extracted paths into a command program
///
/// Emits the initialization bracket, one block per path (rapid to the
/// first vertex, laser on, engrave moves, laser off), and the closing
/// bracket (rapid to origin, home). An empty path list still produces
/// the minimal valid program. The laser is toggled exactly once per
/// path; paths with fewer than two vertices carry nothing to engrave
/// and are skipped.
pub fn compile(paths: &[TracedPath], scale: ScaleFactor, params: &CompilerParams) -> ToolpathProgram {
    let mut commands = vec![
        Command::SetUnits,
        Command::SetAbsoluteMode,
        Command::SetTravelRate(params.travel_rate),
        Command::SetEngraveRate(params.engrave_rate),
        Command::LaserOff,
        Command::RapidMoveTo { x: 0.0, y: 0.0 },
    ];

    for path in paths {
        if path.points.len() < 2 {
            continue;
        }
        let scaled: Vec<(f64, f64)> = path.points.iter().map(|p| scale_vertex(*p, scale)).collect();

        let (first_x, first_y) = scaled[0];
        commands.push(Command::RapidMoveTo {
            x: first_x,
            y: first_y,
        });
        commands.push(Command::LaserOn {
            power: params.laser_power,
        });

        match path.kind {
            PathKind::ClosedLoop => {
                for &(x, y) in &scaled[1..] {
                    commands.push(Command::EngraveMoveTo { x, y });
                }
                // Close the loop back to its first vertex.
                commands.push(Command::EngraveMoveTo {
                    x: first_x,
                    y: first_y,
                });
            }
            PathKind::Run => {
                let (x, y) = scaled[scaled.len() - 1];
                commands.push(Command::EngraveMoveTo { x, y });
            }
        }
        commands.push(Command::LaserOff);
    }

    commands.push(Command::RapidMoveTo { x: 0.0, y: 0.0 });
    commands.push(Command::Home);

    let program = ToolpathProgram { commands };
    tracing::debug!(
        commands = program.len(),
        paths = paths.len(),
        "compiled toolpath program"
    );
    program
}

/// Scale a pixel-space vertex into rounded physical coordinates
fn scale_vertex(point: Point, scale: ScaleFactor) -> (f64, f64) {
    (
        round_coord(point.x * scale.value()),
        round_coord(point.y * scale.value()),
    )
}

/// Round a physical coordinate to the fixed 3-decimal precision
fn round_coord(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Check the laser/motion ordering of a program.
///
/// Verifies that engrave moves only happen inside an open laser run,
/// that the laser is off for every rapid move and for homing, and that
/// the program ends with the laser off.
pub fn validate_program(program: &ToolpathProgram) -> CamToolResult<()> {
    let mut laser_on = false;
    for (index, command) in program.commands().iter().enumerate() {
        match command {
            Command::LaserOn { .. } => {
                if laser_on {
                    return Err(CamToolError::GenerationFailed(format!(
                        "laser turned on twice without an intervening off at command {index}"
                    )));
                }
                laser_on = true;
            }
            Command::LaserOff => laser_on = false,
            Command::EngraveMoveTo { .. } => {
                if !laser_on {
                    return Err(CamToolError::GenerationFailed(format!(
                        "engrave move with the laser off at command {index}"
                    )));
                }
            }
            Command::RapidMoveTo { .. } | Command::Home => {
                if laser_on {
                    return Err(CamToolError::GenerationFailed(format!(
                        "motion with the laser on at command {index}"
                    )));
                }
            }
            _ => {}
        }
    }
    if laser_on {
        return Err(CamToolError::GenerationFailed(
            "program ends with the laser on".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_scale() -> ScaleFactor {
        ScaleFactor::fit(10.0, 10, 10).unwrap()
    }

    #[test]
    fn empty_path_list_compiles_to_minimal_program() {
        let program = compile(&[], unit_scale(), &CompilerParams::default());
        assert_eq!(
            program.commands(),
            &[
                Command::SetUnits,
                Command::SetAbsoluteMode,
                Command::SetTravelRate(5000.0),
                Command::SetEngraveRate(1500.0),
                Command::LaserOff,
                Command::RapidMoveTo { x: 0.0, y: 0.0 },
                Command::RapidMoveTo { x: 0.0, y: 0.0 },
                Command::Home,
            ]
        );
        assert!(validate_program(&program).is_ok());
    }

    #[test]
    fn run_block_engraves_to_its_end_point() {
        let run = TracedPath::run(Point::new(0.0, 4.0), Point::new(9.0, 4.0));
        let scale = ScaleFactor::fit(10.0, 10, 10).unwrap();
        let program = compile(&[run], scale, &CompilerParams::default());

        let block = &program.commands()[6..10];
        assert_eq!(
            block,
            &[
                Command::RapidMoveTo { x: 0.0, y: 4.0 },
                Command::LaserOn { power: 255 },
                Command::EngraveMoveTo { x: 9.0, y: 4.0 },
                Command::LaserOff,
            ]
        );
    }

    #[test]
    fn loop_block_returns_to_first_vertex() {
        let square = TracedPath::closed_loop(vec![
            Point::new(0.0, 0.0),
            Point::new(9.0, 0.0),
            Point::new(9.0, 9.0),
            Point::new(0.0, 9.0),
        ]);
        let program = compile(&[square], unit_scale(), &CompilerParams::default());

        let block = &program.commands()[6..13];
        assert_eq!(block[0], Command::RapidMoveTo { x: 0.0, y: 0.0 });
        assert_eq!(block[1], Command::LaserOn { power: 255 });
        // Three interior vertices plus the closing edge back to the start.
        assert_eq!(block[5], Command::EngraveMoveTo { x: 0.0, y: 0.0 });
        assert_eq!(block[6], Command::LaserOff);
        assert!(validate_program(&program).is_ok());
    }

    #[test]
    fn vertices_are_scaled_and_rounded() {
        // 30 px wide at 20 units target: scale = 2/3, full of repeating
        // decimals before rounding.
        let run = TracedPath::run(Point::new(1.0, 0.0), Point::new(29.0, 0.0));
        let scale = ScaleFactor::fit(20.0, 30, 30).unwrap();
        let program = compile(&[run], scale, &CompilerParams::default());

        assert_eq!(
            program.commands()[6],
            Command::RapidMoveTo { x: 0.667, y: 0.0 }
        );
        assert_eq!(
            program.commands()[8],
            Command::EngraveMoveTo { x: 19.333, y: 0.0 }
        );
    }

    #[test]
    fn degenerate_paths_are_skipped() {
        let dot = TracedPath::closed_loop(vec![Point::new(3.0, 3.0)]);
        let program = compile(&[dot], unit_scale(), &CompilerParams::default());
        // Same as the empty program: no block was emitted.
        assert_eq!(program.len(), 8);
    }

    #[test]
    fn rendering_is_line_oriented_ascii() {
        let run = TracedPath::run(Point::new(0.0, 0.0), Point::new(9.0, 0.0));
        let program = compile(&[run], unit_scale(), &CompilerParams::default());
        let text = program.render();

        assert!(text.is_ascii());
        assert!(text.ends_with('\n'));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "G21");
        assert_eq!(lines[1], "G90");
        assert_eq!(lines[2], "G0 F5000");
        assert_eq!(lines[3], "G1 F1500");
        assert_eq!(lines[4], "M5");
        assert_eq!(lines[5], "G0 X0.000 Y0.000");
        assert_eq!(lines[6], "G0 X0.000 Y0.000");
        assert_eq!(lines[7], "M3 S255");
        assert_eq!(lines[8], "G1 X9.000 Y0.000");
        assert_eq!(lines[9], "M5");
    }

    #[test]
    fn validator_rejects_cold_engrave_moves() {
        let program = ToolpathProgram {
            commands: vec![
                Command::SetUnits,
                Command::EngraveMoveTo { x: 1.0, y: 1.0 },
            ],
        };
        assert!(validate_program(&program).is_err());
    }

    #[test]
    fn validator_rejects_hot_rapids() {
        let program = ToolpathProgram {
            commands: vec![
                Command::LaserOn { power: 10 },
                Command::RapidMoveTo { x: 1.0, y: 1.0 },
            ],
        };
        assert!(validate_program(&program).is_err());
    }

    #[test]
    fn duration_estimate_tracks_rates_and_distances() {
        // One run: rapid 10 units out at 600/min, engrave 10 units at
        // 60/min, rapid 14.142 back. 600/min = 10/s, 60/min = 1/s.
        let run = TracedPath::run(Point::new(0.0, 10.0), Point::new(10.0, 10.0));
        let scale = ScaleFactor::fit(10.0, 10, 10).unwrap();
        let params = CompilerParams {
            laser_power: 255,
            travel_rate: 600.0,
            engrave_rate: 60.0,
        };
        let program = compile(&[run], scale, &params);
        let secs = program.estimate_duration().as_secs_f64();
        // 1.0s rapid out + 10.0s engrave + ~1.41s rapid home.
        assert!((secs - 12.414).abs() < 0.01, "estimated {secs}s");
    }
}
