use std::{io::ErrorKind, path::Path};

use anyhow::Result;
use tokio::io::{self, AsyncWriteExt};

/// Reads a whole file. A missing file is not an error and yields `None`.
pub async fn read_to_string_opt(path: &Path) -> Result<Option<String>, io::Error> {
    match tokio::fs::read_to_string(path).await {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Replaces the content of `path` without leaving a half written file behind. The data is
/// written into a sibling temporary file which is then renamed over the target.
pub async fn write_atomically(path: &Path, content: &[u8]) -> Result<(), io::Error> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    let mut file = tokio::fs::File::create(tmp_path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(tmp_path, path).await
}

/// Turns an arbitrary storage key into a file name, so keys like `@app/settings` still map to a
/// single file.
pub fn encode_file_name(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

/// Reverses [encode_file_name]. Returns `None` for names that it couldn't have produced.
pub fn decode_file_name(name: &str) -> Option<String> {
    let decoded = urlencoding::decode(name).ok()?.into_owned();
    (encode_file_name(&decoded) == name).then_some(decoded)
}
