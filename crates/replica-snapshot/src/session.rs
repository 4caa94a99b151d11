//! Capture session: serialization plus asynchronous completions.
//!
//! A [`CaptureSession`] owns the capture state and a single-threaded
//! executor. Each wait (frame document, stylesheet, clone, image) is a
//! local task that never touches the host; it reports back over a channel
//! and the session handles the event with the host borrowed mutably.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;
use std::time::Duration;

use smol::channel::{Receiver, Sender, unbounded};
use smol::{LocalExecutor, Timer};
use tracing::{debug, warn};

use crate::host::{HostError, LoadOutcome, Readiness, SourceTree, StylesheetHost};
use crate::policy::SerializePolicy;
use crate::resources::wait_once;
use crate::serialize::{CaptureState, Deferred, Serializer};
use crate::types::SerializedNode;

/// Result of an asynchronous capture step.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion<N> {
    /// A frame's document became available and was serialized.
    FrameLoaded {
        /// The `iframe` element.
        frame: N,
        /// The serialized nested document.
        document: SerializedNode,
    },
    /// A `link` was re-serialized after its sheet loaded or a clone
    /// resolved.
    StylesheetLoaded {
        /// The `link` element.
        link: N,
        /// The re-serialized `link`, with `_cssText` when it is readable.
        node: SerializedNode,
    },
    /// An image raster was captured after the initial serialization.
    ImageInlined {
        /// The `img` element.
        image: N,
        /// Its serialized id.
        id: i64,
        /// The `rr_dataURL` value.
        data_url: String,
    },
}

#[derive(Debug)]
enum ResourceEvent<N> {
    Frame {
        frame: N,
    },
    Stylesheet {
        link: N,
    },
    Clone {
        url: String,
        link: N,
        outcome: Option<LoadOutcome>,
    },
    Image {
        image: N,
        id: i64,
        attempt: ImageAttempt,
        outcome: Option<LoadOutcome>,
    },
    Sweep(u64),
}

#[derive(Debug)]
enum ImageAttempt {
    First,
    /// Anonymous retry, holding the `crossorigin` value to restore.
    Retry(Option<String>),
}

impl<N> ResourceEvent<N> {
    /// Sweeps are housekeeping; nothing waits on them.
    const fn is_tracked(&self) -> bool {
        !matches!(self, Self::Sweep(_))
    }
}

/// Capture state plus the executor resolving its waits.
pub struct CaptureSession<N: 'static> {
    executor: Rc<LocalExecutor<'static>>,
    state: CaptureState<N>,
    policy: SerializePolicy,
    sender: Sender<ResourceEvent<N>>,
    receiver: Receiver<ResourceEvent<N>>,
    pending: usize,
    completions: VecDeque<Completion<N>>,
}

impl<N> CaptureSession<N>
where
    N: Copy + Eq + Hash + Debug + 'static,
{
    /// A session capturing under `policy`.
    #[must_use]
    pub fn new(policy: SerializePolicy) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            executor: Rc::new(LocalExecutor::new()),
            state: CaptureState::new(),
            policy,
            sender,
            receiver,
            pending: 0,
            completions: VecDeque::new(),
        }
    }

    /// The capture state (mirror, ids, stylesheet records).
    #[must_use]
    pub const fn state(&self) -> &CaptureState<N> {
        &self.state
    }

    /// Mutable capture state.
    pub fn state_mut(&mut self) -> &mut CaptureState<N> {
        &mut self.state
    }

    /// The capture policy.
    #[must_use]
    pub const fn policy(&self) -> &SerializePolicy {
        &self.policy
    }

    /// Number of waits not yet resolved.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.pending
    }

    /// Serialize `node` and arm waits for whatever is not ready.
    pub fn serialize<H>(&mut self, host: &mut H, node: N) -> Option<SerializedNode>
    where
        H: SourceTree<Node = N> + StylesheetHost<Node = N>,
    {
        let (serialized, deferred) = {
            let mut serializer = Serializer::new(&*host, &mut self.state, &self.policy);
            let serialized = serializer.serialize(node);
            (serialized, serializer.finish())
        };
        self.arm(host, deferred);
        serialized
    }

    /// Like [`Self::serialize`], calling `hook` with every node that gets a
    /// real id.
    pub fn serialize_with_hook<H>(
        &mut self,
        host: &mut H,
        node: N,
        hook: &mut dyn FnMut(N),
    ) -> Option<SerializedNode>
    where
        H: SourceTree<Node = N> + StylesheetHost<Node = N>,
    {
        let (serialized, deferred) = {
            let mut serializer =
                Serializer::new(&*host, &mut self.state, &self.policy).with_on_serialize(hook);
            let serialized = serializer.serialize(node);
            (serialized, serializer.finish())
        };
        self.arm(host, deferred);
        serialized
    }

    /// Run ready tasks and handle every event already delivered, without
    /// blocking.
    pub fn poll_completions<H>(&mut self, host: &mut H) -> Vec<Completion<N>>
    where
        H: SourceTree<Node = N> + StylesheetHost<Node = N>,
    {
        loop {
            while self.executor.try_tick() {}
            let Ok(event) = self.receiver.try_recv() else {
                break;
            };
            self.handle(host, event);
        }
        self.completions.drain(..).collect()
    }

    /// Block until every armed wait has resolved (by event or timeout),
    /// including waits armed while handling completions.
    pub fn settle<H>(&mut self, host: &mut H) -> Vec<Completion<N>>
    where
        H: SourceTree<Node = N> + StylesheetHost<Node = N>,
    {
        let executor = Rc::clone(&self.executor);
        smol::block_on(executor.run(async {
            while self.pending > 0 {
                let Ok(event) = self.receiver.recv().await else {
                    break;
                };
                self.handle(host, event);
            }
        }));
        // Sweeps that fired meanwhile.
        while let Ok(event) = self.receiver.try_recv() {
            self.handle(host, event);
        }
        self.completions.drain(..).collect()
    }

    fn spawn_wait<F>(&mut self, readiness: Readiness, timeout: Duration, event: F)
    where
        F: FnOnce(Option<LoadOutcome>) -> ResourceEvent<N> + 'static,
    {
        let sender = self.sender.clone();
        self.pending += 1;
        self.executor
            .spawn(async move {
                let outcome = wait_once(readiness, timeout).await;
                let _ = sender.send(event(outcome)).await;
            })
            .detach();
    }

    fn spawn_sweep(&self, generation: u64) {
        let sender = self.sender.clone();
        let delay = self.policy.stylesheet_timeout();
        self.executor
            .spawn(async move {
                let _ = Timer::after(delay).await;
                let _ = sender.send(ResourceEvent::Sweep(generation)).await;
            })
            .detach();
    }

    fn arm<H>(&mut self, host: &mut H, deferred: Vec<Deferred<N>>)
    where
        H: SourceTree<Node = N> + StylesheetHost<Node = N>,
    {
        for item in deferred {
            match item {
                Deferred::Frame { frame } => {
                    if let Some(readiness) = host.frame_readiness(frame) {
                        let timeout = self.policy.iframe_timeout();
                        self.spawn_wait(readiness, timeout, move |_| ResourceEvent::Frame { frame });
                    }
                }
                Deferred::Stylesheet {
                    link,
                    blocked: false,
                    ..
                } => {
                    let readiness = StylesheetHost::stylesheet_readiness(host, link);
                    let timeout = self.policy.stylesheet_timeout();
                    self.spawn_wait(readiness, timeout, move |_| ResourceEvent::Stylesheet { link });
                }
                Deferred::Stylesheet {
                    link,
                    blocked: true,
                    ..
                } => {
                    let Some(registration) = self.state.stylesheets.register_clone(host, link) else {
                        continue;
                    };
                    let readiness = StylesheetHost::stylesheet_readiness(host, registration.clone);
                    let timeout = self.policy.stylesheet_timeout();
                    let url = registration.url;
                    self.spawn_wait(readiness, timeout, move |outcome| ResourceEvent::Clone {
                        url,
                        link,
                        outcome,
                    });
                    self.spawn_sweep(registration.generation);
                }
                Deferred::Image {
                    image,
                    id,
                    cross_origin_retry,
                } => {
                    let attempt = if cross_origin_retry {
                        let prior = SourceTree::attribute(host, image, "crossorigin");
                        host.set_cross_origin(image, Some("anonymous"));
                        ImageAttempt::Retry(prior)
                    } else {
                        ImageAttempt::First
                    };
                    let readiness = host.image_readiness(image);
                    let timeout = self.policy.image_timeout();
                    self.spawn_wait(readiness, timeout, move |outcome| ResourceEvent::Image {
                        image,
                        id,
                        attempt,
                        outcome,
                    });
                }
            }
        }
    }

    fn handle<H>(&mut self, host: &mut H, event: ResourceEvent<N>)
    where
        H: SourceTree<Node = N> + StylesheetHost<Node = N>,
    {
        if event.is_tracked() {
            self.pending = self.pending.saturating_sub(1);
        }
        match event {
            ResourceEvent::Frame { frame } => {
                let Some(document) = host.content_document(frame) else {
                    debug!(?frame, "frame has no inspectable document");
                    return;
                };
                if let Some(document) = self.serialize(host, document) {
                    self.completions
                        .push_back(Completion::FrameLoaded { frame, document });
                }
            }
            ResourceEvent::Stylesheet { link } => self.reserialize_link(host, link),
            ResourceEvent::Clone { url, link, outcome } => match outcome {
                Some(LoadOutcome::Loaded) => {
                    let _ = self.state.stylesheets.on_load(host, &url);
                    self.reserialize_link(host, link);
                }
                Some(LoadOutcome::Failed) => self.state.stylesheets.on_error(host, &url),
                None => debug!(%url, "stylesheet clone timed out"),
            },
            ResourceEvent::Image {
                image,
                id,
                attempt,
                outcome,
            } => self.finish_image(host, image, id, attempt, outcome),
            ResourceEvent::Sweep(generation) => {
                let _ = self.state.stylesheets.sweep(host, generation);
            }
        }
    }

    fn reserialize_link<H>(&mut self, host: &mut H, link: N)
    where
        H: SourceTree<Node = N> + StylesheetHost<Node = N>,
    {
        let (serialized, deferred) = {
            let mut serializer = Serializer::new(&*host, &mut self.state, &self.policy);
            let serialized = serializer.serialize(link);
            (serialized, serializer.finish())
        };
        // A link waits once; a sheet still missing after its wait stays
        // missing. A sheet that turned out cross-origin still gets a clone.
        let deferred = deferred
            .into_iter()
            .filter(|item| {
                !matches!(item, Deferred::Stylesheet { link: waited, blocked: false, .. } if *waited == link)
            })
            .collect();
        self.arm(host, deferred);
        if let Some(node) = serialized {
            self.completions
                .push_back(Completion::StylesheetLoaded { link, node });
        }
    }

    fn finish_image<H>(
        &mut self,
        host: &mut H,
        image: N,
        id: i64,
        attempt: ImageAttempt,
        outcome: Option<LoadOutcome>,
    ) where
        H: SourceTree<Node = N> + StylesheetHost<Node = N>,
    {
        let result = (outcome == Some(LoadOutcome::Loaded)).then(|| {
            let options = &self.policy.data_url_options;
            host.image_data_url(image, &options.mime_type, options.quality)
        });
        let first = match attempt {
            ImageAttempt::First => true,
            ImageAttempt::Retry(prior) => {
                host.set_cross_origin(image, prior.as_deref());
                false
            }
        };
        let Some(result) = result else {
            debug!(?image, ?outcome, "image not loaded");
            return;
        };
        match result {
            Ok(data_url) => {
                self.state.record_inlined_image(image, data_url.clone());
                self.completions.push_back(Completion::ImageInlined {
                    image,
                    id,
                    data_url,
                });
            }
            Err(HostError::Security(_))
                if first
                    && SourceTree::attribute(host, image, "crossorigin").as_deref()
                        != Some("anonymous") =>
            {
                self.arm(
                    host,
                    vec![Deferred::Image {
                        image,
                        id,
                        cross_origin_retry: true,
                    }],
                );
            }
            Err(err) => warn!(?image, %err, "cannot inline image"),
        }
    }
}
