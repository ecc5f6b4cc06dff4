//! The bootstrap state machine.
//!
//! Every invocation (first boot, after the kernel reboot, after a crash)
//! enters at [`Phase::FixNetwork`] and walks the phases in order. Phases that
//! already completed on this node find their marker in the [`StateStore`]
//! and fall through, so the machine effectively resumes where the last
//! invocation stopped. The only early exit that is not an error is the
//! kernel reboot checkpoint.

use cmd_lib::*;
use std::io::Error;
use strum::{AsRefStr, Display};

use crate::config::{BootstrapConfig, Role};
use crate::host::{ExecContext, Host};
use crate::kernel::{self, KernelGate};
use crate::state::StateStore;
use crate::{deps, network, repo, role, tuning};

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    FixNetwork,
    InstallKernel,
    TuneNode,
    InstallDeps,
    ProvisionRepo,
    StartRole,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    PendingReboot,
}

pub struct Bootstrap<'a, H: Host> {
    host: &'a H,
    config: &'a BootstrapConfig,
    role: Role,
    state: StateStore,
    admin: ExecContext,
    user: ExecContext,
}

impl<'a, H: Host> Bootstrap<'a, H> {
    pub fn new(host: &'a H, config: &'a BootstrapConfig, role: Role, state: StateStore) -> Self {
        Self {
            host,
            config,
            role,
            state,
            admin: ExecContext::AsAdmin,
            user: ExecContext::AsUser(config.repo.operator_user.clone()),
        }
    }

    pub fn run(&mut self) -> Result<Outcome, Error> {
        let mut phase = Phase::FixNetwork;
        loop {
            info!("Entering phase {phase}");
            phase = match self.step(phase)? {
                Some(next) => next,
                None => return Ok(Outcome::PendingReboot),
            };
            if phase == Phase::Done {
                return Ok(Outcome::Completed);
            }
        }
    }

    /// Runs one phase and returns the next one, or `None` when the node is
    /// about to reboot and this invocation must stop.
    fn step(&mut self, phase: Phase) -> Result<Option<Phase>, Error> {
        let next = match phase {
            Phase::FixNetwork => {
                network::normalize(self.host, &self.admin, &self.config.network);
                Phase::InstallKernel
            }
            Phase::InstallKernel => {
                match kernel::ensure_kernel(
                    self.host,
                    &self.admin,
                    &self.config.kernel,
                    &mut self.state,
                )? {
                    KernelGate::Satisfied => Phase::TuneNode,
                    KernelGate::RebootIssued => return Ok(None),
                }
            }
            Phase::TuneNode => {
                tuning::tune(self.host, &self.admin, &self.config.tuning);
                Phase::InstallDeps
            }
            Phase::InstallDeps => {
                deps::install(self.host, &self.admin, &mut self.state)?;
                Phase::ProvisionRepo
            }
            Phase::ProvisionRepo => {
                repo::provision(self.host, &self.user, self.config, &mut self.state)?;
                Phase::StartRole
            }
            Phase::StartRole => {
                role::dispatch(self.host, &self.user, self.role, &self.config.source_dir())?;
                Phase::Done
            }
            Phase::Done => Phase::Done,
        };
        Ok(Some(next))
    }
}
