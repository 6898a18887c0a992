//! Run lifecycle and the outbound frame stream.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strand_contract::FailureKind;
use strand_state::{apply_patch, Patch, StateError, StateResult};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// A frame on the client-facing stream.
///
/// The stream is patches followed by exactly one terminal frame. Replaying
/// the patch frames over `{"messages": []}` reconstructs the live document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    /// A batch of state operations.
    Patch { patch: Patch },
    /// The run finished normally.
    Completed,
    /// The run hit a fatal fault.
    Failed { kind: FailureKind },
}

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Created, nothing streamed yet.
    Created,
    /// At least one patch has been streamed.
    Streaming,
    /// Finished normally; the stream is closed.
    Completed,
    /// Hit a fatal fault; the stream is closed.
    Failed(FailureKind),
    /// The client went away; nothing more is streamed.
    Cancelled,
}

impl RunPhase {
    /// True once the run can no longer accept patches.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunPhase::Created | RunPhase::Streaming)
    }
}

/// Controller-side failures.
#[derive(Debug, Error)]
pub enum RunError {
    /// A patch arrived after the run reached a terminal phase.
    #[error("run is already terminal ({0:?})")]
    Terminated(RunPhase),

    /// The frame receiver was dropped; the client disconnected.
    #[error("frame stream disconnected")]
    Disconnected,

    /// A patch could not be applied to the live document.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Owns the live run-state document and mirrors every mutation onto the
/// outbound frame stream.
///
/// The document is mutated exclusively through [`RunController::append_patch`],
/// which applies the patch locally and then forwards the identical patch as a
/// frame. The two views can therefore never diverge.
pub struct RunController {
    doc: Value,
    phase: RunPhase,
    frames: mpsc::Sender<StreamFrame>,
}

impl RunController {
    /// Create a controller over an empty conversation document.
    pub fn new(frames: mpsc::Sender<StreamFrame>) -> Self {
        Self {
            doc: json!({"messages": []}),
            phase: RunPhase::Created,
            frames,
        }
    }

    /// The live document.
    pub fn state(&self) -> &Value {
        &self.doc
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Apply a patch to the live document and stream it to the client.
    ///
    /// The local application happens first; a patch that fails to apply is
    /// never streamed.
    pub async fn append_patch(&mut self, patch: Patch) -> Result<(), RunError> {
        if self.phase.is_terminal() {
            return Err(RunError::Terminated(self.phase));
        }
        if patch.is_empty() {
            return Ok(());
        }

        self.doc = apply_patch(&self.doc, &patch)?;
        self.phase = RunPhase::Streaming;

        if self.frames.send(StreamFrame::Patch { patch }).await.is_err() {
            debug!("frame receiver dropped, cancelling run");
            self.phase = RunPhase::Cancelled;
            return Err(RunError::Disconnected);
        }
        Ok(())
    }

    /// Close the run normally.
    pub async fn complete(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = RunPhase::Completed;
        let _ = self.frames.send(StreamFrame::Completed).await;
    }

    /// Close the run with a fatal fault.
    pub async fn fail(&mut self, kind: FailureKind) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = RunPhase::Failed(kind);
        let _ = self.frames.send(StreamFrame::Failed { kind }).await;
    }
}

/// Fold a frame sequence back into the document it describes.
///
/// This is the client's view of a run: starting from `{"messages": []}` and
/// applying every patch frame in order yields exactly the controller's final
/// document.
pub fn replay<'a>(frames: impl IntoIterator<Item = &'a StreamFrame>) -> StateResult<Value> {
    let mut doc = json!({"messages": []});
    for frame in frames {
        if let StreamFrame::Patch { patch } = frame {
            doc = apply_patch(&doc, patch)?;
        }
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use strand_state::{path, Op};

    fn controller() -> (RunController, mpsc::Receiver<StreamFrame>) {
        let (tx, rx) = mpsc::channel(64);
        (RunController::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<StreamFrame>) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn streamed_frames_replay_to_the_live_document() {
        let (mut ctrl, mut rx) = controller();
        ctrl.append_patch(Patch::from(Op::append(
            path!("messages"),
            json!({"role": "user", "content": "hi"}),
        )))
        .await
        .unwrap();
        ctrl.append_patch(Patch::from(Op::append(
            path!("messages"),
            json!({"role": "assistant", "content": ""}),
        )))
        .await
        .unwrap();
        ctrl.append_patch(Patch::from(Op::str_append(
            path!("messages", 1, "content"),
            "hello",
        )))
        .await
        .unwrap();
        ctrl.complete().await;

        let frames = drain(&mut rx);
        assert_eq!(frames.last(), Some(&StreamFrame::Completed));
        assert_eq!(&replay(&frames).unwrap(), ctrl.state());
        assert_eq!(ctrl.state()["messages"][1]["content"], "hello");
    }

    #[tokio::test]
    async fn failing_patches_are_never_streamed() {
        let (mut ctrl, mut rx) = controller();
        let bad = Patch::from(Op::str_append(path!("messages", 5, "content"), "x"));
        assert!(matches!(
            ctrl.append_patch(bad).await,
            Err(RunError::State(_))
        ));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(ctrl.state(), &json!({"messages": []}));
    }

    #[tokio::test]
    async fn terminal_run_rejects_further_patches() {
        let (mut ctrl, _rx) = controller();
        ctrl.complete().await;
        assert_eq!(ctrl.phase(), RunPhase::Completed);

        let patch = Patch::from(Op::append(path!("messages"), json!({})));
        assert!(matches!(
            ctrl.append_patch(patch).await,
            Err(RunError::Terminated(RunPhase::Completed))
        ));

        // A later fault cannot demote the completed phase.
        ctrl.fail(FailureKind::UpstreamFault).await;
        assert_eq!(ctrl.phase(), RunPhase::Completed);
    }

    #[tokio::test]
    async fn dropped_receiver_cancels_the_run() {
        let (tx, rx) = mpsc::channel(1);
        let mut ctrl = RunController::new(tx);
        drop(rx);

        let patch = Patch::from(Op::append(path!("messages"), json!({})));
        assert!(matches!(
            ctrl.append_patch(patch).await,
            Err(RunError::Disconnected)
        ));
        assert_eq!(ctrl.phase(), RunPhase::Cancelled);
    }

    #[test]
    fn frame_wire_encoding() {
        let frame = StreamFrame::Patch {
            patch: Patch::from(Op::str_append(path!("messages", 0, "content"), "hi")),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "patch");
        assert_eq!(json["patch"][0]["op"], "str_append");

        let failed = StreamFrame::Failed {
            kind: FailureKind::CorrelationFault,
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(
            json,
            json!({"type": "failed", "kind": "correlation_fault"})
        );
    }
}
