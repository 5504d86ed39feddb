use std::fs;
use std::path::Path;

use sockprims_frame::{FrameReader, FrameWriter};
use sockprims_transport::connect;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{frame_error, io_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.wait_timeout)?;
    let (framing, mut config) = args.framing.resolve()?;
    config.read_timeout = Some(timeout);
    config.write_timeout = Some(timeout);
    let payload = resolve_payload(
        args.json.as_deref(),
        args.data.as_deref(),
        args.file.as_deref(),
    )?;

    let stream =
        connect(&args.addr, Some(timeout)).map_err(|err| transport_error("connect failed", err))?;
    let peer = args.addr.to_string();
    let read_half = stream
        .try_clone()
        .map_err(|err| io_error("connect failed", err))?;

    let mut writer = FrameWriter::with_config_tcp(stream, &framing, config.clone())
        .map_err(|err| frame_error("send failed", err))?;
    writer
        .send(&payload)
        .map_err(|err| frame_error("send failed", err))?;
    tracing::debug!(%peer, size = payload.len(), framing = framing.name(), "message sent");

    if args.wait {
        let mut reader = FrameReader::with_config_tcp(read_half, &framing, config)
            .map_err(|err| frame_error("receive failed", err))?;
        let reply = reader
            .read_message()
            .map_err(|err| frame_error("receive failed", err))?;
        print_message(&reply, &peer, format);
    }

    Ok(SUCCESS)
}

fn resolve_payload(
    json: Option<&str>,
    data: Option<&str>,
    file: Option<&Path>,
) -> CliResult<Vec<u8>> {
    if let Some(json) = json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
