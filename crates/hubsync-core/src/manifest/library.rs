//! File name → library tag mapping.

use crate::types::TagScope;

/// Library tag implied by a file, if any.
///
/// Only the file name matters; directories are ignored. Data formats are
/// recognised for dataset repositories only, so a model's `config.json` does
/// not tag it as `json`.
pub fn library_tag_for_file(scope: TagScope, path: &str) -> Option<&'static str> {
    let file_name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
    if file_name.is_empty() {
        return None;
    }

    if let Some(tag) = weight_format(&file_name) {
        return Some(tag);
    }
    if scope == TagScope::Dataset {
        return data_format(&file_name);
    }
    None
}

fn weight_format(file_name: &str) -> Option<&'static str> {
    let extension = file_name.rsplit_once('.').map(|(_, ext)| ext)?;

    if file_name == "tf_model.h5" {
        return Some("tensorflow");
    }
    if file_name == "flax_model.msgpack" {
        return Some("jax");
    }
    if file_name.starts_with("pytorch_model") && extension == "bin" {
        return Some("pytorch");
    }

    match extension {
        "safetensors" => Some("safetensors"),
        "pt" | "pth" | "ckpt" => Some("pytorch"),
        "keras" => Some("tensorflow"),
        "onnx" => Some("onnx"),
        "gguf" => Some("gguf"),
        "mlmodel" => Some("coreml"),
        "nemo" => Some("nemo"),
        "tflite" => Some("tflite"),
        "joblib" => Some("joblib"),
        _ => None,
    }
}

fn data_format(file_name: &str) -> Option<&'static str> {
    match file_name.rsplit_once('.').map(|(_, ext)| ext)? {
        "parquet" => Some("parquet"),
        "json" | "jsonl" => Some("json"),
        "csv" => Some("csv"),
        _ => None,
    }
}
