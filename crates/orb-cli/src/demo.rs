//! 演示脚本：逐个运行 A–E 场景并打印结果

use std::cell::Cell;
use std::rc::Rc;

use orb_runtime::{
    ClassInfo, Construct, Instance, Object, OrbArray, OrbBag, OrbInt, OrbMap, OrbRc, OrbString,
    RefPoolStack, Result,
};

fn int_of(obj: Option<Object>) -> Option<i64> {
    obj.as_ref()
        .and_then(|obj| obj.downcast_ref::<OrbInt>())
        .map(OrbInt::value)
}

/// 析构时计数，用来观察释放时机
struct Witness {
    freed: Rc<Cell<u32>>,
}

static WITNESS_CLASS: ClassInfo = ClassInfo::of::<Witness>("Witness");

impl Instance for Witness {
    fn class(&self) -> &'static ClassInfo {
        &WITNESS_CLASS
    }
}

impl Construct for Witness {
    type Args = Rc<Cell<u32>>;

    fn construct(freed: Rc<Cell<u32>>) -> Result<Self> {
        Ok(Witness { freed })
    }
}

impl Drop for Witness {
    fn drop(&mut self) {
        self.freed.set(self.freed.get() + 1);
    }
}

pub fn run() -> Result<()> {
    scenario_a()?;
    scenario_b()?;
    scenario_c()?;
    scenario_d()?;
    scenario_e()?;
    scenario_pool()?;
    Ok(())
}

fn scenario_a() -> Result<()> {
    let map = OrbMap::new();
    map.set_str("a", Some(&OrbInt::object(1)?))?;
    map.set_str("b", Some(&OrbInt::object(2)?))?;
    map.set_str("a", Some(&OrbInt::object(3)?))?;

    println!("[A] map string keys");
    println!("    get(\"a\") = {:?}", int_of(map.get_str("a")?));
    println!("    get(\"b\") = {:?}", int_of(map.get_str("b")?));
    println!("    items     = {}", map.len());
    Ok(())
}

fn scenario_b() -> Result<()> {
    let array = OrbArray::new();
    for v in [10, 20, 30] {
        array.push(&OrbInt::object(v)?)?;
    }
    array.pop();
    array.pop();

    println!("[B] array push/pop");
    println!("    length = {}", array.len());
    println!("    get(0) = {:?}", int_of(array.get(0)));
    Ok(())
}

fn scenario_c() -> Result<()> {
    let map = OrbMap::new();
    for i in 0..4 {
        map.set(&OrbInt::object(i)?, Some(&OrbString::object(&format!("v{i}"))?))?;
    }

    println!("[C] map growth");
    println!("    capacity = {}", map.capacity());
    for i in 0..4 {
        let value = map.get(&OrbInt::object(i)?);
        let text = value
            .as_ref()
            .and_then(|v| v.downcast_ref::<OrbString>())
            .map(OrbString::to_std_string);
        println!("    get({i}) = {text:?}");
    }
    Ok(())
}

fn scenario_d() -> Result<()> {
    let bag = OrbBag::with_capacity(2)?;
    for v in [1, 2, 3] {
        bag.add(OrbInt::object(v)?)?;
    }

    println!("[D] bag growth");
    println!("    capacity = {}", bag.capacity());
    for i in 0..3 {
        println!("    get({i}) = {:?}", int_of(bag.get(i)));
    }
    Ok(())
}

fn scenario_e() -> Result<()> {
    let freed = Rc::new(Cell::new(0));
    let obj = OrbRc::<Witness>::construct(freed.clone())?;
    let first = obj.retain();
    let second = obj.retain();

    println!("[E] retain twice, release three times");
    println!("    ref_count = {}", obj.ref_count());
    obj.release();
    first.release();
    println!("    after two releases: freed = {}", freed.get());
    second.release();
    println!("    after three releases: freed = {}", freed.get());
    Ok(())
}

fn scenario_pool() -> Result<()> {
    let freed = Rc::new(Cell::new(0));
    let stack = RefPoolStack::new();

    println!("[+] nested ref pools");
    {
        let outer = stack.push();
        stack.create::<Witness>(freed.clone())?;
        {
            let _inner = stack.push();
            stack.create::<Witness>(freed.clone())?;
            stack.create::<Witness>(freed.clone())?;
            println!("    depth = {}, outer holds {}", stack.depth(), outer.len());
        }
        println!("    inner popped: freed = {}", freed.get());
    }
    println!("    outer popped: freed = {}", freed.get());
    Ok(())
}
