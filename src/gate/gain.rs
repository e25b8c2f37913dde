/// Applies a per-sample gain reduction produced by a [`Trigger`].
///
/// [`Trigger`]: crate::gate::trigger::Trigger
#[derive(Debug, Default, Clone, Copy)]
pub struct GateGain;

impl GateGain {
    /// Multiply `samples` by `10^(dB / 20)` sample by sample.
    #[inline]
    pub fn apply(&self, reduction_db: &[f32], samples: &mut [f32]) {
        debug_assert_eq!(reduction_db.len(), samples.len());
        for (sample, db) in samples.iter_mut().zip(reduction_db) {
            if *db != 0.0 {
                *sample *= 10f32.powf(db / 20.0);
            }
        }
    }
}
