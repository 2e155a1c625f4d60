//! FFmpeg command builder.

use std::path::{Path, PathBuf};

/// Null device path used as the pass-1 output of two-pass encodes.
#[cfg(unix)]
pub const NULL_OUTPUT: &str = "/dev/null";
#[cfg(windows)]
pub const NULL_OUTPUT: &str = "NUL";

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Treat the input as a concat demuxer list file.
    pub fn concat_input(self) -> Self {
        self.input_arg("-f").input_arg("concat").input_arg("-safe").input_arg("0")
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set audio filter.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Copy both streams without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set video bitrate in kbit/s.
    pub fn video_bitrate_kbps(self, kbps: u32) -> Self {
        self.output_arg("-b:v").output_arg(format!("{}k", kbps))
    }

    /// Constrain the bitrate envelope (maxrate + bufsize) in kbit/s.
    pub fn constrained_bitrate_kbps(self, kbps: u32) -> Self {
        self.output_arg("-maxrate")
            .output_arg(format!("{}k", kbps))
            .output_arg("-bufsize")
            .output_arg(format!("{}k", kbps * 2))
    }

    /// Set audio bitrate (e.g. "128k").
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Drop the audio track.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Limit encoder threads.
    pub fn threads(self, n: u32) -> Self {
        self.output_arg("-threads").output_arg(n.to_string())
    }

    /// Set a two-pass encode pass number with its stats-file prefix.
    pub fn pass(self, pass: u8, logfile: impl AsRef<Path>) -> Self {
        self.output_arg("-pass")
            .output_arg(pass.to_string())
            .output_arg("-passlogfile")
            .output_arg(logfile.as_ref().to_string_lossy().to_string())
    }

    /// Force an output container format (needed when writing to the null device).
    pub fn format(self, fmt: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(fmt)
    }

    /// Relocate the moov atom for streaming-friendly MP4 output.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(30.0)
            .video_codec("libx264")
            .crf(20);

        let args = cmd.build_args();
        assert!(args.contains(&"-ss".to_string()));
        assert!(args.contains(&"10.000".to_string()));
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert_eq!(args.last().unwrap(), "output.mp4");
    }

    #[test]
    fn test_two_pass_args() {
        let cmd = FfmpegCommand::new("in.mp4", NULL_OUTPUT)
            .video_bitrate_kbps(900)
            .pass(1, "/tmp/job/ffpass")
            .no_audio()
            .format("mp4");

        let args = cmd.build_args();
        assert!(args.contains(&"-pass".to_string()));
        assert!(args.contains(&"1".to_string()));
        assert!(args.contains(&"-passlogfile".to_string()));
        assert!(args.contains(&"900k".to_string()));
        assert!(args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_concat_input_args_precede_input() {
        let cmd = FfmpegCommand::new("list.txt", "out.mp4").concat_input().codec_copy();
        let args = cmd.build_args();
        let f_pos = args.iter().position(|a| a == "-f").unwrap();
        let i_pos = args.iter().position(|a| a == "-i").unwrap();
        assert!(f_pos < i_pos);
    }
}
