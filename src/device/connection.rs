use futures::StreamExt;
use futures::channel::mpsc::{channel, Sender, UnboundedReceiver, UnboundedSender};
use log::{debug, info};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::device::platform::{BlePlatform, Capabilities, PlatformEvent};
use crate::device::session::Session;
use crate::device::types::{SessionCommand, SessionEvent};

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Runs the session as a single task: commands from the front end, platform events and timer
/// deadlines are handled one at a time, so none of them can interleave with another.
///
/// Cancelling `cancel` tears down any scan or connection before the task ends.
pub fn session_task<P, C>(
    cancel: CancellationToken,
    mut session: Session<P, C, UnboundedSender<SessionEvent>>,
    mut platform_events: UnboundedReceiver<PlatformEvent>,
) -> (Sender<SessionCommand>, JoinHandle<()>)
where
    P: BlePlatform + Send + 'static,
    C: Capabilities + Send + 'static,
{
    let (tx, mut rx) = channel::<SessionCommand>(32);

    let handle = spawn(async move {
        'mainloop: loop {
            let deadline = session.next_deadline();

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Session task cancelled");
                    session.stop_scan();
                    session.disconnect();
                    break 'mainloop;
                },
                Some(command) = rx.next() => {
                    debug!("Session command {:?}", command);
                    session.handle_command(command);
                },
                Some(event) = platform_events.next() => {
                    session.handle_platform_event(event);
                },
                _ = sleep_until_deadline(deadline) => {
                    session.fire_due_timers(Instant::now());
                },
            }
        }
    });

    (tx, handle)
}
