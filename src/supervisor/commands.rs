//! Pipeline command lines for streaming with one remote peer

use crate::cameras::{CameraSettings, CameraSpec};

/// Video source that needs the camera GUID passed explicitly
const FIREWIRE_SOURCE: &str = "dc1394src";

/// One pipeline process to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineCommand {
    /// Unique per peer, e.g. `send_alice_1`
    pub key: String,
    /// Arguments after the program name
    pub args: Vec<String>,
    /// Host to run on, `None` for this host
    pub host: Option<String>,
}

impl PipelineCommand {
    /// Command line for a POSIX shell, as run through `ssh`
    pub fn command_line(&self, program: &str) -> String {
        let mut line = shell_quote(program);
        for arg in &self.args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        line
    }
}

/// Quote `word` for `sh`. Words made only of safe characters stay bare.
fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@,=+%".contains(c));
    if safe {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', "'\\''"))
}

fn strings<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// All commands needed to stream with `peer_id`
///
/// One video sender per local camera toward the peer's receiver address,
/// one video receiver per remote camera into its shared texture, then one
/// audio sender and one audio receiver.
pub fn commands_for_pair(
    local: &CameraSettings,
    remote: &CameraSettings,
    peer_id: &str,
) -> Vec<PipelineCommand> {
    let mut commands = Vec::new();

    for (n, spec) in local.camera_specs().iter().enumerate() {
        let mut args = strings(["-s", "--videosource"]);
        args.push(local.video_source.clone());
        args.extend([
            "--width".to_string(),
            local.width.to_string(),
            "--height".to_string(),
            local.height.to_string(),
            "--videobitrate".to_string(),
            local.video_bitrate.to_string(),
            "--videocodec".to_string(),
            local.video_codec.clone(),
            "--framerate".to_string(),
            local.framerate.to_string(),
        ]);
        if local.grayscale {
            args.push("--grayscale".to_string());
        }
        args.extend([
            "--address".to_string(),
            remote.receiver_address.clone(),
            "--videoport".to_string(),
            spec.port.to_string(),
        ]);
        if local.video_source == FIREWIRE_SOURCE {
            args.extend(["--camera-guid".to_string(), spec.camera_id.clone()]);
        }
        // Senders run where the camera is
        commands.push(PipelineCommand {
            key: format!("send_{}_{}", peer_id, n + 1),
            args,
            host: Some(spec.host.clone()),
        });
    }

    for (n, spec) in remote.camera_specs().iter().enumerate() {
        commands.push(PipelineCommand {
            key: format!("recv_{}_{}", peer_id, n + 1),
            args: receiver_args(remote, spec, peer_id, n + 1),
            host: None,
        });
    }

    let mut audio_send = strings(["-s", "--numchannels", "1", "--audioport"]);
    audio_send.push(local.send_audio_port.to_string());
    audio_send.extend(strings([
        "--audiocodec",
        "raw",
        "--audiosource",
        "jackaudiosrc",
        "--disable-jack-autoconnect",
        "--jack-client-name",
    ]));
    audio_send.push(format!("s_{}", peer_id));
    audio_send.extend(["--address".to_string(), remote.receiver_address.clone()]);
    commands.push(PipelineCommand {
        key: format!("send_{}_AUDIO", peer_id),
        args: audio_send,
        host: None,
    });

    let mut audio_recv = strings(["-r", "--numchannels", "1", "--audioport"]);
    audio_recv.push(remote.send_audio_port.to_string());
    audio_recv.extend(strings([
        "--audiocodec",
        "raw",
        "--audiosink",
        "jackaudiosink",
        "--disable-jack-autoconnect",
        "--jack-client-name",
    ]));
    audio_recv.push(format!("r_{}", peer_id));
    audio_recv.extend(["--address".to_string(), remote.receiver_address.clone()]);
    commands.push(PipelineCommand {
        key: format!("recv_{}_AUDIO", peer_id),
        args: audio_recv,
        host: None,
    });

    commands
}

fn receiver_args(
    remote: &CameraSettings,
    spec: &CameraSpec,
    peer_id: &str,
    number: usize,
) -> Vec<String> {
    vec![
        "-r".to_string(),
        "--width".to_string(),
        remote.width.to_string(),
        "--height".to_string(),
        remote.height.to_string(),
        "--videocodec".to_string(),
        remote.video_codec.clone(),
        "--address".to_string(),
        spec.host.clone(),
        "--videoport".to_string(),
        spec.port.to_string(),
        "--videosink".to_string(),
        "sharedvideosink".to_string(),
        "--shared-video-id".to_string(),
        spec.texture_id(),
        "--text-overlay".to_string(),
        format!("{} {}", peer_id, number),
        // Shared textures come out upside down
        "--flip-video".to_string(),
        "vertical-flip".to_string(),
    ]
}
