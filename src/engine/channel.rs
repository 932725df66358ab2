//! Result channels: how one worker's (min, max) pair gets back to the
//! orchestrator.
//!
//! Two interchangeable transports implement [`ResultChannel`]:
//!
//! - [`PipeChannel`]: a dedicated pipe whose write end becomes the worker's
//!   stdout; the worker writes one fixed-width binary pair.
//! - [`FileChannel`]: an artifact file in the work directory, named by
//!   partition index, holding `"<min> <max>\n"`.
//!
//! Either way the aggregator sees the same thing: a complete pair, or nothing.

use super::aggregate::PartialResult;
use super::ipc::{self, PipeFd};
use crate::array::MinMax;
use crate::error::{EngineError, Result};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::os::unix::io::OwnedFd;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Run-wide choice of result transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Pipe,
    File,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pipe => write!(f, "pipe"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Orchestrator-side end of one partition's channel.
pub trait ResultChannel: Send {
    /// Partition this channel belongs to.
    fn partition(&self) -> usize;

    /// Wire the channel into the worker's command before it is spawned.
    fn attach(&mut self, cmd: &mut Command) -> Result<()>;

    /// Drop every worker-side end still held by the orchestrator.
    ///
    /// Must run after the worker is spawned and before collecting, otherwise
    /// a reader could wait forever on a writer that is us.
    fn seal(&mut self);

    /// Retrieve the partial result and release the channel's resources.
    fn collect(self: Box<Self>) -> PartialResult;
}

/// Open one channel per partition for the chosen transport.
///
/// Fails with a resource error before anything is spawned; channels opened
/// so far are released when the returned error drops them.
pub fn open_channels(
    transport: Transport,
    partitions: usize,
    work_dir: &Path,
) -> Result<Vec<Box<dyn ResultChannel>>> {
    (0..partitions)
        .map(|index| -> Result<Box<dyn ResultChannel>> {
            match transport {
                Transport::Pipe => Ok(Box::new(PipeChannel::open(index)?)),
                Transport::File => Ok(Box::new(FileChannel::open(work_dir, index)?)),
            }
        })
        .collect()
}

/// Stream-pipe transport.
pub struct PipeChannel {
    partition: usize,
    read: PipeFd,
    write: Option<OwnedFd>,
}

impl PipeChannel {
    pub fn open(partition: usize) -> Result<Self> {
        let (read, write) = ipc::create_pipe()?;
        Ok(Self {
            partition,
            read,
            write: Some(write),
        })
    }
}

impl ResultChannel for PipeChannel {
    fn partition(&self) -> usize {
        self.partition
    }

    fn attach(&mut self, cmd: &mut Command) -> Result<()> {
        let write = self.write.as_ref().ok_or_else(|| {
            EngineError::Channel(format!("pipe for partition {} already sealed", self.partition))
        })?;
        let child_end = write
            .try_clone()
            .map_err(|e| EngineError::Resource(format!("failed to dup pipe: {}", e)))?;
        cmd.stdout(Stdio::from(child_end));
        Ok(())
    }

    fn seal(&mut self) {
        self.write = None;
    }

    fn collect(mut self: Box<Self>) -> PartialResult {
        self.seal();
        let value = match ipc::read_pair(&mut self.read) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(partition = self.partition, error = %e, "Failed to read result pipe");
                None
            }
        };
        PartialResult::new(self.partition, value)
    }
}

/// Name of the artifact written for `partition`.
pub fn artifact_name(partition: usize) -> String {
    format!("pminmax-part-{}.txt", partition)
}

/// Temp-file transport.
pub struct FileChannel {
    partition: usize,
    path: PathBuf,
    released: bool,
}

impl FileChannel {
    /// Claim the artifact path for `partition`, clearing any stale leftover.
    pub fn open(work_dir: &Path, partition: usize) -> Result<Self> {
        let path = work_dir.join(artifact_name(partition));
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed stale artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(EngineError::Resource(format!(
                    "cannot clear artifact {}: {}",
                    path.display(),
                    e
                )));
            }
        }
        Ok(Self {
            partition,
            path,
            released: false,
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove artifact");
        }
    }
}

impl ResultChannel for FileChannel {
    fn partition(&self) -> usize {
        self.partition
    }

    fn attach(&mut self, cmd: &mut Command) -> Result<()> {
        cmd.arg("--output").arg(&self.path);
        cmd.stdout(Stdio::null());
        Ok(())
    }

    fn seal(&mut self) {}

    fn collect(mut self: Box<Self>) -> PartialResult {
        let value = match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let parsed = parse_pair(&contents);
                if parsed.is_none() {
                    tracing::warn!(partition = self.partition, "Malformed result artifact");
                }
                parsed
            }
            Err(e) => {
                tracing::debug!(partition = self.partition, error = %e, "No result artifact");
                None
            }
        };
        self.release();
        PartialResult::new(self.partition, value)
    }
}

impl Drop for FileChannel {
    fn drop(&mut self) {
        self.release();
    }
}

/// Parse `"<min> <max>"`. Anything else is treated as garbage.
pub fn parse_pair(contents: &str) -> Option<MinMax> {
    let mut fields = contents.split_whitespace();
    let min = fields.next()?.parse().ok()?;
    let max = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(MinMax { min, max })
}

/// Worker-side destination for the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSink {
    /// Binary pair on stdout (the pipe transport).
    Stdout,
    /// Text pair in an artifact file.
    File(PathBuf),
}

impl ResultSink {
    pub fn from_output(output: Option<PathBuf>) -> Self {
        output.map_or(Self::Stdout, Self::File)
    }

    /// Write the pair to `stdout` or the artifact file.
    pub fn publish<W: Write>(&self, pair: MinMax, stdout: &mut W) -> io::Result<()> {
        match self {
            Self::Stdout => {
                stdout.write_all(&ipc::encode_pair(pair))?;
                stdout.flush()
            }
            Self::File(path) => fs::write(path, format!("{} {}\n", pair.min, pair.max)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("-5 12\n"), Some(MinMax::new(-5, 12)));
        assert_eq!(parse_pair("  3\t4  "), Some(MinMax::new(3, 4)));
        assert_eq!(parse_pair("3"), None);
        assert_eq!(parse_pair("3 x"), None);
        assert_eq!(parse_pair("1 2 3"), None);
        assert_eq!(parse_pair(""), None);
    }

    #[test]
    fn test_file_channel_collects_and_removes() {
        let dir = tempdir().unwrap();
        let channel = FileChannel::open(dir.path(), 0).unwrap();
        let path = channel.path().to_path_buf();

        ResultSink::File(path.clone())
            .publish(MinMax::new(-1, 99), &mut io::sink())
            .unwrap();
        assert!(path.exists());

        let result = Box::new(channel).collect();
        assert_eq!(result.value, Some(MinMax::new(-1, 99)));
        assert!(!path.exists());
    }

    #[test]
    fn test_file_channel_missing_artifact_is_absent() {
        let dir = tempdir().unwrap();
        let channel = FileChannel::open(dir.path(), 4).unwrap();
        let result = Box::new(channel).collect();
        assert_eq!(result.partition, 4);
        assert!(!result.is_present());
    }

    #[test]
    fn test_file_channel_garbage_is_absent_and_removed() {
        let dir = tempdir().unwrap();
        let channel = FileChannel::open(dir.path(), 1).unwrap();
        fs::write(channel.path(), "12").unwrap();
        let path = channel.path().to_path_buf();

        let result = Box::new(channel).collect();
        assert!(!result.is_present());
        assert!(!path.exists());
    }

    #[test]
    fn test_file_channel_clears_stale_artifact() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join(artifact_name(2));
        fs::write(&stale, "0 0\n").unwrap();

        let channel = FileChannel::open(dir.path(), 2).unwrap();
        assert!(!stale.exists());
        assert!(!Box::new(channel).collect().is_present());
    }

    #[test]
    fn test_dropped_file_channel_removes_artifact() {
        let dir = tempdir().unwrap();
        let channel = FileChannel::open(dir.path(), 0).unwrap();
        fs::write(channel.path(), "1 2\n").unwrap();
        let path = channel.path().to_path_buf();
        drop(channel);
        assert!(!path.exists());
    }

    #[test]
    fn test_pipe_channel_collects_written_pair() {
        let mut channel = PipeChannel::open(3).unwrap();
        let mut writer = PipeFd::new(channel.write.as_ref().unwrap().try_clone().unwrap());
        ResultSink::Stdout
            .publish(MinMax::new(i32::MIN, 0), &mut writer)
            .unwrap();
        drop(writer);
        channel.seal();

        let result = Box::new(channel).collect();
        assert_eq!(result.partition, 3);
        assert_eq!(result.value, Some(MinMax::new(i32::MIN, 0)));
    }

    #[test]
    fn test_pipe_channel_without_writer_is_absent() {
        // collect() seals first, so this cannot block on our own write end.
        let channel = PipeChannel::open(0).unwrap();
        assert!(!Box::new(channel).collect().is_present());
    }

    #[test]
    fn test_attach_after_seal_fails() {
        let mut channel = PipeChannel::open(0).unwrap();
        channel.seal();
        let mut cmd = Command::new("true");
        assert!(matches!(
            channel.attach(&mut cmd),
            Err(EngineError::Channel(_))
        ));
    }

    #[test]
    fn test_open_channels_per_transport() {
        let dir = tempdir().unwrap();
        let pipes = open_channels(Transport::Pipe, 3, dir.path()).unwrap();
        let files = open_channels(Transport::File, 2, dir.path()).unwrap();
        let indices: Vec<_> = pipes.iter().map(|c| c.partition()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_sink_from_output() {
        assert_eq!(ResultSink::from_output(None), ResultSink::Stdout);
        assert_eq!(
            ResultSink::from_output(Some(PathBuf::from("x.txt"))),
            ResultSink::File(PathBuf::from("x.txt"))
        );
    }
}
