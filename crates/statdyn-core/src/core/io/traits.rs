use crate::core::models::snapshot::Snapshot;
use crate::core::models::trajectory::Trajectory;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Defines the interface for trajectory file formats.
///
/// A format opens a path into a [`Trajectory`] that decodes frames on demand, and
/// serializes snapshots back into the same format.
pub trait TrajectoryFile: Trajectory + Sized {
    /// The error type for I/O operations.
    type Error: Error + From<io::Error>;

    /// Opens a trajectory file and indexes its frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, a frame header is malformed, or the
    /// frames are inconsistent (unordered timesteps, varying particle counts).
    fn open<P: AsRef<Path>>(path: P) -> Result<Self, Self::Error>;

    /// Writes a single snapshot as one frame.
    fn write_frame(snapshot: &Snapshot, writer: &mut impl Write) -> Result<(), Self::Error>;

    /// Writes snapshots as consecutive frames.
    fn write_frames(frames: &[Snapshot], writer: &mut impl Write) -> Result<(), Self::Error> {
        for frame in frames {
            Self::write_frame(frame, writer)?;
        }
        Ok(())
    }

    /// Writes snapshots to a file path, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_frames_to_path<P: AsRef<Path>>(
        frames: &[Snapshot],
        path: P,
    ) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_frames(frames, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
