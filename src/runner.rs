//! The top-level demo loop.

use crate::config::DemoConfig;
use crate::credentials::{self, CredentialStore};
use crate::demo::current_cert_works;
use crate::error::Error;
use crate::network::Connect;
use crate::platform::Clock;
use crate::rotation::RotationAgent;

/// Run demo rounds until `iterations` is reached or something fails.
///
/// Every round checks the current certificate with a full demo round and
/// logs the credentials in use. A failing check ends the run; if the
/// failing certificate was installed by the previous round's rotation it is
/// rolled back first and [`Error::RotatedCertificateRejected`] is returned.
/// With rotation enabled each successful round is followed by a request for
/// a new cloud certificate, which is installed before the next round.
pub fn run<N, K, S>(
    config: &DemoConfig,
    network: &mut N,
    agent: &mut RotationAgent<S>,
    clock: &K,
) -> Result<(), Error>
where
    N: Connect,
    K: Clock,
    S: CredentialStore,
{
    config.validate()?;

    let mut round: u32 = 0;
    loop {
        round = round.saturating_add(1);
        info!("Starting demo round {}.", round);

        let checked = current_cert_works(config, network, &agent.store, clock);
        credentials::log_summary(&agent.store, &config.host);

        match checked {
            Ok(()) => agent.commit(),
            Err(err) => {
                error!("Current certificate does not work: {:?}", err);
                if agent.rollback()? {
                    return Err(Error::RotatedCertificateRejected);
                }
                return Err(err);
            }
        }

        if config.rotation_enabled {
            agent
                .get_new_cloud_cert(config, network, clock)
                .and_then(|()| agent.rotate_cert())
                .inspect_err(|err| error!("Could not get new cert. ({:?})", err))?;
        }

        if config.iterations.is_some_and(|limit| round >= limit) {
            info!("Demo finished after {} rounds.", round);
            return Ok(());
        }
        clock.sleep_ms(config.rotation_delay_ms);
    }
}
