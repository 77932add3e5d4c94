//! 随机操作序列与 std 容器对照检查

use std::collections::HashMap;

use clap::ValueEnum;
use thiserror::Error;

use orb_runtime::{Object, OrbArray, OrbBag, OrbInt, OrbMap, RuntimeError};

use crate::random::Mt19937;

/// 键空间；越小冲突与删除越频繁
const KEY_SPACE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    Map,
    Array,
    Bag,
    All,
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("{target} diverged from model at op {step}: {detail}")]
    Mismatch {
        target: &'static str,
        step: usize,
        detail: String,
    },
}

/// 单个容器的运行结果
#[derive(Debug)]
pub struct Report {
    pub target: &'static str,
    pub ops: usize,
    pub final_len: usize,
    pub peak_capacity: usize,
}

fn ensure(
    ok: bool,
    target: &'static str,
    step: usize,
    detail: impl FnOnce() -> String,
) -> Result<(), CheckError> {
    if ok {
        Ok(())
    } else {
        Err(CheckError::Mismatch {
            target,
            step,
            detail: detail(),
        })
    }
}

fn int(value: i64) -> Result<Object, CheckError> {
    Ok(OrbInt::object(value)?)
}

fn int_of(obj: &Object) -> Option<i64> {
    obj.downcast_ref::<OrbInt>().map(OrbInt::value)
}

pub fn run(seed: u32, ops: usize, target: Target) -> Result<Vec<Report>, CheckError> {
    let mut rng = Mt19937::new(seed);
    let mut reports = Vec::new();

    if matches!(target, Target::Map | Target::All) {
        reports.push(stress_map(&mut rng, ops)?);
    }
    if matches!(target, Target::Array | Target::All) {
        reports.push(stress_array(&mut rng, ops)?);
    }
    if matches!(target, Target::Bag | Target::All) {
        reports.push(stress_bag(&mut rng, ops)?);
    }

    Ok(reports)
}

fn stress_map(rng: &mut Mt19937, ops: usize) -> Result<Report, CheckError> {
    const T: &str = "map";
    let map = OrbMap::new();
    let mut model: HashMap<i64, i64> = HashMap::new();
    let mut peak = 0;

    for step in 0..ops {
        let key = rng.below(KEY_SPACE) as i64;
        let key_obj = int(key)?;

        match rng.below(20) {
            0..=10 => {
                let value = step as i64;
                map.set(&key_obj, Some(&int(value)?))?;
                let fresh = model.insert(key, value).is_none();

                let cap = map.capacity();
                ensure(cap.is_power_of_two(), T, step, || {
                    format!("capacity {cap} is not a power of two")
                })?;
                // 覆盖不触发扩容，只检查新键插入
                ensure(!fresh || map.len() * 4 / cap < 3, T, step, || {
                    format!("load {}/{} too high after insert", map.len(), cap)
                })?;
                let got = map.get(&key_obj).as_ref().and_then(int_of);
                ensure(got == Some(value), T, step, || {
                    format!("key {key}: wrote {value}, read {got:?}")
                })?;
            }
            11..=16 => {
                map.remove(&key_obj)?;
                let deleted = model.remove(&key).is_some();
                ensure(!map.contains_key(&key_obj), T, step, || {
                    format!("key {key} still present after delete")
                })?;

                let cap = map.capacity();
                ensure(!deleted || cap == 1 || map.len() * 4 / cap > 1, T, step, || {
                    format!("load {}/{} too low after delete", map.len(), cap)
                })?;
            }
            _ => {
                let got = map.get(&key_obj).as_ref().and_then(int_of);
                let want = model.get(&key).copied();
                ensure(got == want, T, step, || {
                    format!("key {key}: expected {want:?}, got {got:?}")
                })?;
            }
        }

        ensure(map.len() == model.len(), T, step, || {
            format!("len {} != model {}", map.len(), model.len())
        })?;
        peak = peak.max(map.capacity());
    }

    for (&key, &want) in &model {
        let got = map.get(&int(key)?).as_ref().and_then(int_of);
        ensure(got == Some(want), T, ops, || {
            format!("final check key {key}: expected {want}, got {got:?}")
        })?;
    }
    let visited = map.iter().count();
    ensure(visited == model.len(), T, ops, || {
        format!("iteration visited {visited} entries, model has {}", model.len())
    })?;

    tracing::debug!(ops, len = map.len(), capacity = map.capacity(), "map stress done");
    Ok(Report {
        target: T,
        ops,
        final_len: map.len(),
        peak_capacity: peak,
    })
}

fn stress_array(rng: &mut Mt19937, ops: usize) -> Result<Report, CheckError> {
    const T: &str = "array";
    let array = OrbArray::new();
    let mut model: Vec<i64> = Vec::new();
    let mut peak = 0;

    for step in 0..ops {
        let value = step as i64;
        match rng.below(10) {
            0..=4 => {
                array.push(&int(value)?)?;
                model.push(value);
            }
            5..=6 => {
                let got = array.pop().as_ref().and_then(int_of);
                let want = model.pop();
                ensure(got == want, T, step, || {
                    format!("pop: expected {want:?}, got {got:?}")
                })?;
            }
            7 => {
                let index = rng.below(model.len() + 1);
                let stored = array.set(index, &int(value)?);
                ensure(stored == (index < model.len()), T, step, || {
                    format!("set({index}) returned {stored} with len {}", model.len())
                })?;
                if let Some(slot) = model.get_mut(index) {
                    *slot = value;
                }
            }
            _ => {
                let index = rng.below(model.len() + 1);
                let got = array.get(index).as_ref().and_then(int_of);
                let want = model.get(index).copied();
                ensure(got == want, T, step, || {
                    format!("get({index}): expected {want:?}, got {got:?}")
                })?;
            }
        }

        ensure(array.len() == model.len(), T, step, || {
            format!("len {} != model {}", array.len(), model.len())
        })?;
        peak = peak.max(array.len());
    }

    let values: Vec<Option<i64>> = array.iter().map(|obj| int_of(&obj)).collect();
    let expected: Vec<Option<i64>> = model.iter().copied().map(Some).collect();
    ensure(values == expected, T, ops, || "final contents differ".to_string())?;

    tracing::debug!(ops, len = array.len(), "array stress done");
    Ok(Report {
        target: T,
        ops,
        final_len: array.len(),
        peak_capacity: peak,
    })
}

fn stress_bag(rng: &mut Mt19937, ops: usize) -> Result<Report, CheckError> {
    const T: &str = "bag";
    let bag = OrbBag::with_capacity(1)?;
    let mut model: Vec<i64> = Vec::new();
    let mut peak = 0;

    for step in 0..ops {
        let value = step as i64;
        match rng.below(10) {
            0..=5 => {
                bag.add(int(value)?)?;
                model.push(value);
            }
            6..=7 if !model.is_empty() => {
                let index = rng.below(model.len());
                let last = model.last().copied();
                let got = bag.remove_at(index).as_ref().and_then(int_of);
                let want = model.swap_remove(index);
                ensure(got == Some(want), T, step, || {
                    format!("remove_at({index}): expected {want}, got {got:?}")
                })?;
                if index < model.len() {
                    let moved = bag.get(index).as_ref().and_then(int_of);
                    ensure(moved == last, T, step, || {
                        format!("slot {index} holds {moved:?}, expected old last {last:?}")
                    })?;
                }
            }
            8 => {
                let got = bag.remove_last().as_ref().and_then(int_of);
                let want = model.pop();
                ensure(got == want, T, step, || {
                    format!("remove_last: expected {want:?}, got {got:?}")
                })?;
            }
            _ => {
                if model.is_empty() {
                    continue;
                }
                let index = rng.below(model.len());
                let got = bag.get(index).as_ref().and_then(int_of);
                ensure(got == Some(model[index]), T, step, || {
                    format!("get({index}): expected {}, got {got:?}", model[index])
                })?;
            }
        }

        ensure(bag.len() == model.len(), T, step, || {
            format!("len {} != model {}", bag.len(), model.len())
        })?;
        ensure(bag.capacity() >= bag.len(), T, step, || {
            format!("capacity {} below size {}", bag.capacity(), bag.len())
        })?;
        peak = peak.max(bag.capacity());
    }

    tracing::debug!(ops, len = bag.len(), capacity = bag.capacity(), "bag stress done");
    Ok(Report {
        target: T,
        ops,
        final_len: bag.len(),
        peak_capacity: peak,
    })
}
