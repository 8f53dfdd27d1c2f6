// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! This module provides the cooperative interrupt guard used by the solver
//! loop. While a guard is alive, SIGINT only raises a flag which the loop
//! polls between batches; once the guard is dropped the previous handling is
//! back in place, and the signal is re-raised so the default behavior still
//! happens for the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::SIGINT;
use signal_hook::SigId;

/// An RAII guard around the interrupt flag. Meant to be scoped around one
/// `run` invocation.
pub struct SignalGuard {
    flag: Arc<AtomicBool>,
    id: SigId,
}

impl SignalGuard {
    /// Installs the flag-raising SIGINT handling.
    pub fn install() -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let id = signal_hook::flag::register(SIGINT, Arc::clone(&flag))
            .expect("the SIGINT handler could not be installed");
        SignalGuard { flag, id }
    }

    /// True once an interrupt arrived since this guard was installed.
    pub fn signaled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self.id);
        if self.signaled() {
            let _ = signal_hook::low_level::raise(SIGINT);
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
