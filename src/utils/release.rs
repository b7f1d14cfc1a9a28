//! Run-on-drop cleanup guard for releasing a resource on an early-return
//! failure path.

pub struct DropRelease<F: FnMut()> {
    func: F,
    armed: bool,
}

impl<F: FnMut()> DropRelease<F> {
    pub fn new(func: F) -> Self {
        DropRelease { func, armed: true }
    }

    /// Disarms the guard: its cleanup closure will not run on drop. Call
    /// this once the thing it was protecting has succeeded.
    pub fn forget(mut self) {
        self.armed = false;
    }
}

impl<F: FnMut()> Drop for DropRelease<F> {
    fn drop(&mut self) {
        if self.armed {
            (self.func)();
        }
    }
}
