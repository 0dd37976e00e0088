use std::sync::Arc;

use super::runtime::FieldScope;
use crate::json_ext::Path;

/// The field being resolved, and where its value goes.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) path: Path,
    pub(crate) field: Arc<FieldScope>,
}

/// Fields currently being resolved, innermost last.
///
/// Frames are pushed when a field starts resolving (or resumes from the lazy queue) and
/// popped when that step returns, whatever its outcome. A run that ends with frames left
/// is reported as unbalanced.
#[derive(Debug, Default)]
pub(crate) struct ResolutionStack {
    frames: Vec<Frame>,
}

impl ResolutionStack {
    pub(crate) fn push(&mut self, path: Path, field: Arc<FieldScope>) {
        self.frames.push(Frame { path, field });
    }

    pub(crate) fn pop(&mut self) -> Option<Frame> {
        let frame = self.frames.pop();
        if frame.is_none() {
            failfast_error!("resolution stack popped while empty");
        }
        frame
    }

    pub(crate) fn current(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::json_ext::Object;

    fn scope(field_name: &str) -> Arc<FieldScope> {
        Arc::new(FieldScope {
            owner_type: "Query".to_string(),
            declared_on: "Query".to_string(),
            field_name: field_name.to_string(),
            arguments: Object::new(),
            nodes: Vec::new(),
            object: Arc::new(json!({})),
            grandparent: None,
        })
    }

    #[test]
    fn innermost_frame_is_current() {
        let mut stack = ResolutionStack::default();
        assert!(stack.current().is_none());
        stack.push(Path::from("a"), scope("a"));
        stack.push(Path::from("a/0/b"), scope("b"));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.current().unwrap().field.field_name, "b");
        assert_eq!(stack.pop().unwrap().path, Path::from("a/0/b"));
        assert_eq!(stack.current().unwrap().path, Path::from("a"));
        stack.pop();
        assert!(stack.is_empty());
    }
}
