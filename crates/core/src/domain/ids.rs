// Deterministic identifier derivation.
//
// jobId = hash(jobType, canonicalizedParameters)
// taskId = hash(jobId, stage, semanticIndex)
//
// A DefaultHasher is used instead of a keyed/randomized hasher: its seed is
// fixed (0, 0) across process restarts, which is exactly what "deterministic
// across retries and redeliveries" requires.

use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Produce a canonical string form of a JSON value: object keys sorted
/// recursively. Two semantically-equal parameter maps serialize identically
/// regardless of field insertion order.
pub fn canonicalize(value: &Value) -> String {
    fn write_canonical(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(key).unwrap());
                    out.push(':');
                    write_canonical(&map[*key], out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_canonical(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn stable_hash(parts: &[&str]) -> String {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.hash(&mut hasher);
        0u8.hash(&mut hasher); // separator, avoids ("ab","c") == ("a","bc")
    }
    format!("{:016x}", hasher.finish())
}

pub fn job_id(job_type: &str, parameters: &Value) -> String {
    format!("job-{}", stable_hash(&[job_type, &canonicalize(parameters)]))
}

pub fn task_id(job_id: &str, stage: i64, semantic_index: &str) -> String {
    format!(
        "task-{}",
        stable_hash(&[job_id, &stage.to_string(), semantic_index])
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_id_is_stable_across_key_order() {
        let a = job_id("RASTER_TO_COG", &json!({"path": "a.tif", "dpi": 300}));
        let b = job_id("RASTER_TO_COG", &json!({"dpi": 300, "path": "a.tif"}));
        assert_eq!(a, b);
    }

    fn job_id2(job_type: &str, parameters: &Value) -> String {
        job_id(job_type, parameters)
    }

    #[test]
    fn job_id_differs_on_parameters() {
        let a = job_id2("RASTER_TO_COG", &json!({"path": "a.tif"}));
        let b = job_id2("RASTER_TO_COG", &json!({"path": "b.tif"}));
        assert_ne!(a, b);
    }

    #[test]
    fn task_id_is_deterministic() {
        let a = task_id("job-abc", 1, "0");
        let b = task_id("job-abc", 1, "0");
        assert_eq!(a, b);
    }

    #[test]
    fn task_id_differs_by_semantic_index() {
        let a = task_id("job-abc", 1, "0");
        let b = task_id("job-abc", 1, "1");
        assert_ne!(a, b);
    }
}
