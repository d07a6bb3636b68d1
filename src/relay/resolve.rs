//! Media-type and filename resolution for flattened leaf parts.

use tracing::warn;

use crate::error::SniffError;
use crate::message::LeafPart;
use crate::sniff::TypeSniffer;

/// Media type assumed when nothing better can be determined.
pub const DEFAULT_MEDIA_TYPE: &str = "text/plain";

/// A leaf part with its media type and display name settled.
#[derive(Debug, Clone)]
pub struct ResolvedAttachment {
    /// Position in the flattened leaf sequence, 0-based.
    pub index: usize,
    pub media_type: String,
    pub filename: String,
    /// True when the filename came from the part's own headers rather than
    /// being synthesized.
    pub has_explicit_name: bool,
    pub payload: Vec<u8>,
}

/// Resolves a leaf's media type. A declared Content-Type wins; otherwise the
/// payload is sniffed. A missing sniffing tool degrades to
/// [`DEFAULT_MEDIA_TYPE`] with a warning instead of failing the message.
pub async fn resolve_media_type(
    leaf: &LeafPart,
    sniffer: &dyn TypeSniffer,
) -> Result<String, SniffError> {
    if let Some(declared) = &leaf.media_type {
        return Ok(declared.clone());
    }
    match sniffer.sniff(&leaf.data).await {
        Ok(sniffed) => Ok(sniffed),
        Err(SniffError::Unavailable { command }) => {
            warn!("sniffing tool '{command}' not found, assuming {DEFAULT_MEDIA_TYPE}");
            Ok(DEFAULT_MEDIA_TYPE.to_string())
        }
        Err(err) => Err(err),
    }
}

/// Resolves a leaf's display name. A filename the part declared for itself
/// is kept as-is; the rest get `File_<index>` plus an extension guessed from
/// the media type, `.txt` when no mapping is known.
pub fn resolve_filename(leaf: &LeafPart, index: usize, media_type: &str) -> (String, bool) {
    if let Some(name) = &leaf.file_name {
        return (name.clone(), true);
    }
    let ext = mime_guess::get_mime_extensions_str(media_type)
        .and_then(|exts| exts.first())
        .unwrap_or(&"txt");
    (format!("File_{index}.{ext}"), false)
}

/// Resolves every leaf in flattened order, keeping indices aligned with the
/// input sequence.
pub async fn resolve_leaves(
    leaves: &[&LeafPart],
    sniffer: &dyn TypeSniffer,
) -> Result<Vec<ResolvedAttachment>, SniffError> {
    let mut resolved = Vec::with_capacity(leaves.len());
    for (index, leaf) in leaves.iter().enumerate() {
        let media_type = resolve_media_type(leaf, sniffer).await?;
        let (filename, has_explicit_name) = resolve_filename(leaf, index, &media_type);
        resolved.push(ResolvedAttachment {
            index,
            media_type,
            filename,
            has_explicit_name,
            payload: leaf.data.clone(),
        });
    }
    Ok(resolved)
}
