use super::IdentityError;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Read a key blob, creating it with `create` only when the file is absent
///
/// The blob is always read back from disk, so a freshly written file goes
/// through the same size check and decode as an existing one. An existing
/// file is never overwritten.
pub fn load_or_create<F>(path: &Path, max: usize, create: F) -> Result<Vec<u8>, IdentityError>
where
    F: FnOnce() -> Result<Vec<u8>, IdentityError>,
{
    if !path.try_exists()? {
        let blob = create()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, &blob)?;
        info!("Generated new key file {}", path.display());
    }

    let size = fs::metadata(path)?.len();
    if size > max as u64 {
        return Err(IdentityError::Oversize { size, max });
    }
    debug!("Loading key file {} ({} bytes)", path.display(), size);
    Ok(fs::read(path)?)
}
