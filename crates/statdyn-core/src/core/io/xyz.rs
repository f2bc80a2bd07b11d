use crate::core::io::traits::TrajectoryFile;
use crate::core::models::simulation_box::SimulationBox;
use crate::core::models::snapshot::Snapshot;
use crate::core::models::trajectory::{
    ParseErrorKind, Trajectory, TrajectoryError, validate_timesteps,
};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, instrument};

const DEFAULT_PROPERTIES: &str = "species:S:1:pos:R:3";

/// Column offsets of the recognized per-particle properties within a body line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnLayout {
    position: usize,
    orientation: Option<usize>,
    image: Option<usize>,
    width: usize,
}

#[derive(Debug, Clone)]
struct FrameRecord {
    body_offset: u64,
    first_line: usize,
    timestep: u64,
    simulation_box: SimulationBox,
    layout: ColumnLayout,
}

/// Extended-XYZ trajectory reader.
///
/// Every frame header is scanned once on construction; particle data is only parsed
/// when a frame is requested, by seeking to the recorded body offset.
pub struct XyzTrajectory<R> {
    reader: R,
    records: Vec<FrameRecord>,
    timesteps: Vec<u64>,
    particle_count: usize,
}

/// An extended-XYZ trajectory backed by a file on disk.
pub type XyzFile = XyzTrajectory<BufReader<File>>;

impl<R: BufRead + Seek> XyzTrajectory<R> {
    #[instrument(skip_all, name = "xyz_index")]
    pub fn from_reader(mut reader: R) -> Result<Self, TrajectoryError> {
        let mut offset = reader.stream_position()?;
        let mut line_number = 0usize;
        let mut line = String::new();
        let mut records = Vec::new();
        let mut particle_count: Option<usize> = None;

        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            offset += read as u64;
            line_number += 1;
            let count_str = line.trim();
            if count_str.is_empty() {
                continue;
            }
            let count: usize = count_str.parse().map_err(|_| TrajectoryError::Parse {
                line: line_number,
                kind: ParseErrorKind::InvalidInt {
                    field: "particle count",
                    value: count_str.to_string(),
                },
            })?;

            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                return Err(TrajectoryError::Corrupt(format!(
                    "frame {} ends before its header line",
                    records.len()
                )));
            }
            offset += read as u64;
            line_number += 1;
            let (timestep, simulation_box, layout) = parse_header(&line, line_number)?;

            match particle_count {
                None => particle_count = Some(count),
                Some(expected) if expected != count => {
                    return Err(TrajectoryError::Corrupt(format!(
                        "frame {} has {} particles, expected {}",
                        records.len(),
                        count,
                        expected
                    )));
                }
                Some(_) => {}
            }

            let body_offset = offset;
            let first_line = line_number + 1;
            for _ in 0..count {
                line.clear();
                let read = reader.read_line(&mut line)?;
                if read == 0 {
                    return Err(TrajectoryError::Corrupt(format!(
                        "frame {} (timestep {}) is truncated",
                        records.len(),
                        timestep
                    )));
                }
                offset += read as u64;
                line_number += 1;
            }

            records.push(FrameRecord {
                body_offset,
                first_line,
                timestep,
                simulation_box,
                layout,
            });
        }

        let Some(particle_count) = particle_count else {
            return Err(TrajectoryError::Corrupt(
                "trajectory contains no frames".to_string(),
            ));
        };
        let timesteps: Vec<u64> = records.iter().map(|r| r.timestep).collect();
        validate_timesteps(&timesteps)?;

        debug!(
            frames = records.len(),
            particles = particle_count,
            "Indexed extended-XYZ trajectory"
        );
        Ok(Self {
            reader,
            records,
            timesteps,
            particle_count,
        })
    }
}

impl<R: BufRead + Seek> Trajectory for XyzTrajectory<R> {
    fn frame_count(&self) -> usize {
        self.records.len()
    }

    fn particle_count(&self) -> usize {
        self.particle_count
    }

    fn timesteps(&self) -> &[u64] {
        &self.timesteps
    }

    fn frame_at(&mut self, index: usize) -> Result<Snapshot, TrajectoryError> {
        let record = self
            .records
            .get(index)
            .ok_or(TrajectoryError::FrameOutOfRange {
                index,
                count: self.records.len(),
            })?;
        self.reader.seek(SeekFrom::Start(record.body_offset))?;

        let layout = record.layout;
        let mut positions = Vec::with_capacity(self.particle_count);
        let mut orientations = layout
            .orientation
            .map(|_| Vec::with_capacity(self.particle_count));
        let mut images = layout.image.map(|_| Vec::with_capacity(self.particle_count));

        let mut line = String::new();
        for particle in 0..self.particle_count {
            let line_number = record.first_line + particle;
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(TrajectoryError::Corrupt(format!(
                    "frame {} ended after {} of {} particles",
                    index, particle, self.particle_count
                )));
            }
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < layout.width {
                return Err(TrajectoryError::Parse {
                    line: line_number,
                    kind: ParseErrorKind::TooFewColumns {
                        expected: layout.width,
                        found: columns.len(),
                    },
                });
            }

            let pos = &columns[layout.position..layout.position + 3];
            positions.push(Vector3::new(
                parse_float(pos[0], "pos", line_number)?,
                parse_float(pos[1], "pos", line_number)?,
                parse_float(pos[2], "pos", line_number)?,
            ));

            if let (Some(start), Some(out)) = (layout.orientation, orientations.as_mut()) {
                let q = &columns[start..start + 4];
                let quaternion = Quaternion::new(
                    parse_float(q[0], "orientation", line_number)?,
                    parse_float(q[1], "orientation", line_number)?,
                    parse_float(q[2], "orientation", line_number)?,
                    parse_float(q[3], "orientation", line_number)?,
                );
                if quaternion.norm() <= f64::EPSILON {
                    return Err(TrajectoryError::Parse {
                        line: line_number,
                        kind: ParseErrorKind::InvalidFloat {
                            field: "orientation",
                            value: q.join(" "),
                        },
                    });
                }
                out.push(UnitQuaternion::from_quaternion(quaternion));
            }

            if let (Some(start), Some(out)) = (layout.image, images.as_mut()) {
                let n = &columns[start..start + 3];
                out.push([
                    parse_int(n[0], "image", line_number)?,
                    parse_int(n[1], "image", line_number)?,
                    parse_int(n[2], "image", line_number)?,
                ]);
            }
        }

        let mut snapshot = Snapshot::new(record.timestep, positions, record.simulation_box.clone());
        if let Some(orientations) = orientations {
            snapshot = snapshot
                .with_orientations(orientations)
                .map_err(|e| TrajectoryError::Corrupt(e.to_string()))?;
        }
        if let Some(images) = images {
            snapshot = snapshot
                .with_images(images)
                .map_err(|e| TrajectoryError::Corrupt(e.to_string()))?;
        }
        Ok(snapshot)
    }
}

impl TrajectoryFile for XyzFile {
    type Error = TrajectoryError;

    fn open<P: AsRef<Path>>(path: P) -> Result<Self, Self::Error> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    fn write_frame(snapshot: &Snapshot, writer: &mut impl Write) -> Result<(), Self::Error> {
        let matrix = snapshot.simulation_box().matrix();
        let lattice: Vec<String> = (0..3)
            .flat_map(|col| (0..3).map(move |row| matrix[(row, col)].to_string()))
            .collect();

        let mut properties = String::from(DEFAULT_PROPERTIES);
        if snapshot.orientations().is_some() {
            properties.push_str(":orientation:R:4");
        }
        if snapshot.images().is_some() {
            properties.push_str(":image:I:3");
        }

        writeln!(writer, "{}", snapshot.particle_count())?;
        writeln!(
            writer,
            "Lattice=\"{}\" Properties={} Timestep={}",
            lattice.join(" "),
            properties,
            snapshot.timestep()
        )?;

        for (i, position) in snapshot.positions().iter().enumerate() {
            write!(writer, "A {} {} {}", position.x, position.y, position.z)?;
            if let Some(orientation) = snapshot.orientations().map(|o| &o[i]) {
                let q = orientation.quaternion();
                write!(writer, " {} {} {} {}", q.w, q.i, q.j, q.k)?;
            }
            if let Some(image) = snapshot.images().map(|n| n[i]) {
                write!(writer, " {} {} {}", image[0], image[1], image[2])?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

fn parse_float(value: &str, field: &'static str, line: usize) -> Result<f64, TrajectoryError> {
    value.parse().map_err(|_| TrajectoryError::Parse {
        line,
        kind: ParseErrorKind::InvalidFloat {
            field,
            value: value.to_string(),
        },
    })
}

fn parse_int(value: &str, field: &'static str, line: usize) -> Result<i32, TrajectoryError> {
    value.parse().map_err(|_| TrajectoryError::Parse {
        line,
        kind: ParseErrorKind::InvalidInt {
            field,
            value: value.to_string(),
        },
    })
}

/// Splits an extended-XYZ comment line into lowercase keys and raw values.
fn tokenize_header(line: &str) -> Result<HashMap<String, String>, ParseErrorKind> {
    let mut fields = HashMap::new();
    let mut chars = line.trim().chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|&c| c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        if chars.next() != Some('=') {
            return Err(ParseErrorKind::MalformedHeader(format!(
                "expected '=' after key '{}'",
                key
            )));
        }

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(c) => value.push(c),
                    None => {
                        return Err(ParseErrorKind::MalformedHeader(format!(
                            "unterminated quoted value for '{}'",
                            key
                        )));
                    }
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                value.push(c);
            }
        }
        fields.insert(key.to_ascii_lowercase(), value);
    }
    Ok(fields)
}

fn parse_properties(spec: &str) -> Result<ColumnLayout, ParseErrorKind> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() % 3 != 0 {
        return Err(ParseErrorKind::MalformedHeader(format!(
            "Properties '{}' is not a list of name:type:count triples",
            spec
        )));
    }

    let mut column = 0;
    let mut position = None;
    let mut orientation = None;
    let mut image = None;
    for triple in parts.chunks(3) {
        let (name, kind, count) = (triple[0], triple[1], triple[2]);
        if !matches!(kind, "S" | "R" | "I" | "L") {
            return Err(ParseErrorKind::MalformedHeader(format!(
                "unknown property type '{}' for '{}'",
                kind, name
            )));
        }
        let count: usize = count.parse().map_err(|_| {
            ParseErrorKind::MalformedHeader(format!("invalid column count for '{}'", name))
        })?;
        match (name, kind, count) {
            ("pos", "R", 3) => position = Some(column),
            ("orientation", "R", 4) => orientation = Some(column),
            ("image", "I", 3) => image = Some(column),
            ("pos" | "orientation" | "image", _, _) => {
                return Err(ParseErrorKind::MalformedHeader(format!(
                    "property '{}' has unexpected shape {}:{}",
                    name, kind, count
                )));
            }
            _ => {}
        }
        column += count;
    }

    Ok(ColumnLayout {
        position: position.ok_or(ParseErrorKind::MissingField("pos"))?,
        orientation,
        image,
        width: column,
    })
}

fn parse_header(
    line: &str,
    line_number: usize,
) -> Result<(u64, SimulationBox, ColumnLayout), TrajectoryError> {
    let parse_err = |kind| TrajectoryError::Parse {
        line: line_number,
        kind,
    };
    let fields = tokenize_header(line).map_err(parse_err)?;

    let timestep_str = fields
        .get("timestep")
        .ok_or(parse_err(ParseErrorKind::MissingField("Timestep")))?;
    let timestep: u64 = timestep_str.parse().map_err(|_| {
        parse_err(ParseErrorKind::InvalidInt {
            field: "Timestep",
            value: timestep_str.clone(),
        })
    })?;

    let lattice_str = fields
        .get("lattice")
        .ok_or(parse_err(ParseErrorKind::MissingField("Lattice")))?;
    let lattice = lattice_str
        .split_whitespace()
        .map(|v| {
            v.parse::<f64>().map_err(|_| {
                parse_err(ParseErrorKind::InvalidFloat {
                    field: "Lattice",
                    value: v.to_string(),
                })
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;
    if lattice.len() != 9 {
        return Err(parse_err(ParseErrorKind::MalformedHeader(format!(
            "Lattice needs 9 values, found {}",
            lattice.len()
        ))));
    }
    let simulation_box = SimulationBox::from_lattice_vectors(
        Vector3::new(lattice[0], lattice[1], lattice[2]),
        Vector3::new(lattice[3], lattice[4], lattice[5]),
        Vector3::new(lattice[6], lattice[7], lattice[8]),
    )
    .map_err(|e| parse_err(ParseErrorKind::MalformedHeader(e.to_string())))?;

    let properties = fields
        .get("properties")
        .map(String::as_str)
        .unwrap_or(DEFAULT_PROPERTIES);
    let layout = parse_properties(properties).map_err(parse_err)?;

    Ok((timestep, simulation_box, layout))
}
