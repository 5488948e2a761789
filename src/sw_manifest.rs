// Per-peer input and output files
//
// Input (`in<id>.txt`), whitespace separated:
//   <owned file count>
//   <name> <segment count> <hash>...      (once per owned file)
//   <wanted file count>
//   <name>...
//
// Output (`client<id>_<name>`): one hash per line in segment order.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::SplitWhitespace;

use indexmap::IndexMap;

use crate::sw_error::ManifestError;
use crate::sw_interface::{Manifest, ParticipantId, SegmentHash};

/// What one peer starts with: files it fully owns and files it wants
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerInput {
    pub owned: IndexMap<String, Manifest>,
    pub wanted: Vec<String>,
}

impl PeerInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owning(mut self, file: &str, manifest: Manifest) -> Self {
        self.owned.insert(file.to_string(), manifest);
        self
    }

    pub fn wanting(mut self, file: &str) -> Self {
        self.wanted.push(file.to_string());
        self
    }
}

struct Tokens<'a>(SplitWhitespace<'a>);

impl<'a> Tokens<'a> {
    fn next(&mut self, expected: &'static str) -> Result<&'a str, ManifestError> {
        self.0.next().ok_or(ManifestError::UnexpectedEnd { expected })
    }

    fn count(&mut self, expected: &'static str) -> Result<usize, ManifestError> {
        let token = self.next(expected)?;
        token.parse().map_err(|_| ManifestError::InvalidCount {
            token: token.to_string(),
        })
    }
}

pub fn parse_peer_input(text: &str) -> Result<PeerInput, ManifestError> {
    let mut tokens = Tokens(text.split_whitespace());
    let mut input = PeerInput::new();

    let owned = tokens.count("owned file count")?;
    for _ in 0..owned {
        let name = tokens.next("file name")?.to_string();
        let segments = tokens.count("segment count")?;
        let manifest = (0..segments)
            .map(|_| tokens.next("segment hash")?.parse::<SegmentHash>())
            .collect::<Result<Manifest, _>>()?;
        input.owned.insert(name, manifest);
    }

    let wanted = tokens.count("wanted file count")?;
    for _ in 0..wanted {
        input.wanted.push(tokens.next("wanted file name")?.to_string());
    }

    Ok(input)
}

pub fn load_peer_input(path: &Path) -> Result<PeerInput, ManifestError> {
    let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_peer_input(&text)
}

pub fn input_path(dir: &Path, peer: ParticipantId) -> PathBuf {
    dir.join(format!("in{}.txt", peer))
}

pub fn output_path(dir: &Path, peer: ParticipantId, file: &str) -> PathBuf {
    dir.join(format!("client{}_{}", peer, file))
}

pub fn render_output(segments: &[SegmentHash]) -> String {
    segments
        .iter()
        .map(SegmentHash::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn write_output(path: &Path, segments: &[SegmentHash]) -> Result<(), ManifestError> {
    fs::write(path, render_output(segments)).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}
