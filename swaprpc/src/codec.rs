//! Batch codec: per-endpoint compilation of a procedure table and the
//! runtime encode/decode of call batches.
//!
//! At setup, [`CodecBuilder`] partitions the table for one endpoint: every
//! procedure this side may encode gets a writer registration keyed by its
//! prefixed name (`registry$name` for instanced entries, bare `name`
//! otherwise), every procedure this side decodes gets a reader
//! registration keyed by id. Each registration points at a precomputed
//! [`CallPlan`] that the generic encode/decode loops interpret, so
//! per-procedure specialization happens once at setup and the hot path is
//! a table walk.
//!
//! # Wire layout
//!
//! Cell 0 of a region holds the call count. From cell 1, each call is:
//! the procedure id; every `Str` argument in declaration order
//! (length-prefixed); the instance id, if the procedure is instanced; then
//! every fixed-width argument in declaration order (`Int` via the integer
//! view, `Float` via the float view). Strings go first because they move
//! the shared cursor by a data-dependent amount; once they are consumed,
//! the remaining cells sit at known offsets.

use std::collections::HashMap;

use crate::cells;
use crate::error::{Error, Result};
use crate::table::{ArgKind, ProcedureTable, Value};

/// Default channel capacity in 32-bit cells.
pub const DEFAULT_CHANNEL_SIZE: usize = 32 * 1024;

/// Precomputed encode/decode recipe for one procedure.
#[derive(Debug)]
struct CallPlan {
    id: u32,
    name: String,
    kinds: Vec<ArgKind>,
    instanced: bool,
    /// Cells consumed by the fixed-width tail (instance id + non-str args).
    fixed_cells: usize,
}

/// A procedure table compiled for one endpoint.
pub struct EndpointCodec {
    endpoint: String,
    channel_size: usize,
    plans: Vec<CallPlan>,
    /// Send side: prefixed procedure name (`registry$name` or `name`) →
    /// plan index.
    writers: HashMap<String, usize>,
    /// Receive side: plan index → decodable here.
    readers: Vec<bool>,
}

/// Writer key for a procedure: instanced entries are addressed as
/// `registry$name`, plain entries by their bare name.
fn writer_key(registry: Option<&str>, name: &str) -> String {
    match registry {
        Some(registry) => format!("{}${}", registry, name),
        None => name.to_string(),
    }
}

/// Builder compiling a [`ProcedureTable`] for a local endpoint.
pub struct CodecBuilder<'a> {
    table: &'a ProcedureTable,
    endpoint: String,
    channel_size: usize,
}

impl<'a> CodecBuilder<'a> {
    pub fn new(table: &'a ProcedureTable, endpoint: &str) -> Self {
        Self {
            table,
            endpoint: endpoint.to_string(),
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }

    /// Channel capacity in 32-bit cells (default 32·1024).
    pub fn channel_size(mut self, cells: usize) -> Self {
        self.channel_size = cells;
        self
    }

    /// Compile the table for this endpoint.
    pub fn build(self) -> Result<EndpointCodec> {
        if self.channel_size < 2 {
            return Err(Error::Setup(format!(
                "channel size of {} cells cannot hold a batch",
                self.channel_size
            )));
        }
        if self.endpoint.is_empty() {
            return Err(Error::Setup("endpoint name is empty".to_string()));
        }

        let mut plans = Vec::with_capacity(self.table.len());
        let mut writers = HashMap::new();
        let mut readers = Vec::with_capacity(self.table.len());

        for (index, entry) in self.table.entries().iter().enumerate() {
            let instanced = entry.instance().is_some();
            let fixed_cells = instanced as usize
                + entry
                    .args()
                    .iter()
                    .filter(|k| !matches!(k, ArgKind::Str))
                    .count();
            let plan_index = plans.len();
            plans.push(CallPlan {
                id: (index + 1) as u32,
                name: entry.name().to_string(),
                kinds: entry.args().to_vec(),
                instanced,
                fixed_cells,
            });

            // This side encodes every procedure another endpoint receives;
            // entries without a receiver are symmetric.
            let sends = entry.receiver() != Some(self.endpoint.as_str());
            let receives = match entry.receiver() {
                Some(receiver) => receiver == self.endpoint,
                None => true,
            };
            let key = writer_key(entry.instance(), entry.name());
            if sends && writers.insert(key.clone(), plan_index).is_some() {
                return Err(Error::Setup(format!(
                    "procedure {:?} is encodable twice from endpoint {:?}",
                    key, self.endpoint
                )));
            }
            readers.push(receives);
        }

        Ok(EndpointCodec {
            endpoint: self.endpoint,
            channel_size: self.channel_size,
            plans,
            writers,
            readers,
        })
    }
}

impl EndpointCodec {
    /// The local endpoint name this codec was compiled for.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Channel capacity in cells.
    pub fn channel_size(&self) -> usize {
        self.channel_size
    }

    /// Region size in bytes needed to hold a full channel.
    pub fn required_buffer_size(&self) -> usize {
        self.channel_size * cells::CELL_BYTES
    }

    /// Bind a region as the write target and start a fresh batch.
    ///
    /// Resets the call count and places the cursor at cell 1.
    pub fn begin_write<'a>(&'a self, region: &'a mut [u8]) -> Result<BatchWriter<'a>> {
        let capacity = check_region(region)?.min(self.channel_size);
        cells::write_i32(region, 0, 0)?;
        Ok(BatchWriter {
            codec: self,
            region,
            pos: 1,
            capacity,
        })
    }

    /// Decode every call in the region, dispatching each to `target` in
    /// encoding order. Resets the call count afterwards and returns the
    /// number of calls dispatched.
    pub fn read_batch<T>(&self, region: &mut [u8], target: &mut T) -> Result<usize>
    where
        T: CallTarget + ?Sized,
    {
        check_region(region)?;
        let count = cells::read_i32(region, 0)? as u32 as usize;
        let mut pos = 1usize;
        let mut args: Vec<Value> = Vec::new();

        for _ in 0..count {
            let id = cells::read_i32(region, pos)? as u32;
            pos += 1;
            let plan = self.reader_plan(id)?;

            // Variable-length data first, in declaration order.
            let mut strings = Vec::new();
            for kind in &plan.kinds {
                if matches!(kind, ArgKind::Str) {
                    let (s, next) = cells::read_str(region, pos)?;
                    strings.push(s);
                    pos = next;
                }
            }
            let instance = if plan.instanced {
                let v = cells::read_i32(region, pos)?;
                pos += 1;
                Some(v)
            } else {
                None
            };

            args.clear();
            let mut strings = strings.into_iter();
            for kind in &plan.kinds {
                match kind {
                    ArgKind::Str => args.push(Value::Str(strings.next().unwrap_or_default())),
                    ArgKind::Int => {
                        args.push(Value::Int(cells::read_i32(region, pos)?));
                        pos += 1;
                    }
                    ArgKind::Float => {
                        args.push(Value::Float(cells::read_f32(region, pos)?));
                        pos += 1;
                    }
                }
            }

            target.dispatch(Call {
                id,
                name: &plan.name,
                instance,
                args: &args,
            })?;
        }

        cells::write_i32(region, 0, 0)?;
        Ok(count)
    }

    fn writer_plan(&self, key: &str) -> Result<&CallPlan> {
        self.writers
            .get(key)
            .map(|&index| &self.plans[index])
            .ok_or_else(|| Error::UnknownProcedure(key.to_string()))
    }

    fn reader_plan(&self, id: u32) -> Result<&CallPlan> {
        let index = (id as usize)
            .checked_sub(1)
            .ok_or(Error::UnknownProcedureId(id))?;
        match self.readers.get(index) {
            Some(true) => Ok(&self.plans[index]),
            _ => Err(Error::UnknownProcedureId(id)),
        }
    }
}

/// Number of calls currently encoded in a region, without consuming them.
pub fn batch_len(region: &[u8]) -> Result<usize> {
    check_region(region)?;
    Ok(cells::read_i32(region, 0)? as u32 as usize)
}

fn check_region(region: &[u8]) -> Result<usize> {
    let count = cells::cell_count(region);
    if region.is_empty() || region.len() % cells::CELL_BYTES != 0 {
        return Err(Error::InvalidRegion { len: region.len() });
    }
    Ok(count)
}

/// An in-progress batch bound to a write region.
pub struct BatchWriter<'a> {
    codec: &'a EndpointCodec,
    region: &'a mut [u8],
    pos: usize,
    capacity: usize,
}

impl BatchWriter<'_> {
    /// Append a call to a plain procedure, addressed by its bare name.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<()> {
        self.emit(name, None, args)
    }

    /// Append a call to an instanced procedure.
    ///
    /// `registry` is the instance scope from the table entry; together
    /// with `name` it selects the `registry$name` writer, so procedures
    /// sharing a name under different scopes stay distinguishable.
    /// `instance_id` picks the object out of that registry on the
    /// receiving side.
    pub fn call_instanced(
        &mut self,
        registry: &str,
        name: &str,
        instance_id: i32,
        args: &[Value],
    ) -> Result<()> {
        let key = writer_key(Some(registry), name);
        self.emit(&key, Some(instance_id), args)
    }

    /// Number of calls encoded so far.
    pub fn len(&self) -> usize {
        cells::read_i32(self.region, 0).unwrap_or(0) as u32 as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current cursor position in cells.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Cells still available in this batch.
    pub fn remaining(&self) -> usize {
        self.capacity - self.pos
    }

    fn emit(&mut self, key: &str, instance: Option<i32>, args: &[Value]) -> Result<()> {
        let plan = self.codec.writer_plan(key)?;
        if plan.instanced != instance.is_some() {
            return Err(Error::InstanceMismatch {
                procedure: plan.name.clone(),
                instanced: plan.instanced,
            });
        }
        if args.len() != plan.kinds.len() {
            return Err(Error::ArityMismatch {
                procedure: plan.name.clone(),
                expected: plan.kinds.len(),
                got: args.len(),
            });
        }

        // Validate kinds and size the call before touching the region, so a
        // failed call leaves the batch untouched.
        let mut needed = 1 + plan.fixed_cells;
        for (index, (kind, arg)) in plan.kinds.iter().zip(args).enumerate() {
            if arg.kind() != *kind {
                return Err(Error::ArgumentMismatch {
                    procedure: plan.name.clone(),
                    index,
                    expected: *kind,
                });
            }
            if let Value::Str(s) = arg {
                needed += 1 + s.chars().count();
            }
        }
        if self.pos + needed > self.capacity {
            return Err(Error::CapacityExceeded {
                needed: self.pos + needed,
                capacity: self.capacity,
            });
        }

        let mut pos = self.pos;
        cells::write_i32(self.region, pos, plan.id as i32)?;
        pos += 1;
        for arg in args {
            if let Value::Str(s) = arg {
                pos = cells::write_str(self.region, pos, s)?;
            }
        }
        if let Some(id) = instance {
            cells::write_i32(self.region, pos, id)?;
            pos += 1;
        }
        for arg in args {
            match arg {
                Value::Int(v) => {
                    cells::write_i32(self.region, pos, *v)?;
                    pos += 1;
                }
                Value::Float(v) => {
                    cells::write_f32(self.region, pos, *v)?;
                    pos += 1;
                }
                Value::Str(_) => {}
            }
        }

        self.pos = pos;
        let count = cells::read_i32(self.region, 0)?;
        cells::write_i32(self.region, 0, count + 1)?;
        Ok(())
    }
}

/// One decoded call handed to a dispatch target.
#[derive(Debug)]
pub struct Call<'a> {
    /// 1-based procedure id.
    pub id: u32,
    /// Procedure name from the table.
    pub name: &'a str,
    /// Instance id for instanced procedures.
    pub instance: Option<i32>,
    args: &'a [Value],
}

impl<'a> Call<'a> {
    /// All arguments in declaration order.
    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    /// The instance id; fails if the procedure is not instanced.
    pub fn instance_id(&self) -> Result<i32> {
        self.instance.ok_or_else(|| Error::InstanceMismatch {
            procedure: self.name.to_string(),
            instanced: false,
        })
    }

    /// Argument `index` as an integer.
    pub fn int(&self, index: usize) -> Result<i32> {
        match self.args.get(index) {
            Some(Value::Int(v)) => Ok(*v),
            _ => Err(self.mismatch(index, ArgKind::Int)),
        }
    }

    /// Argument `index` as a float.
    pub fn float(&self, index: usize) -> Result<f32> {
        match self.args.get(index) {
            Some(Value::Float(v)) => Ok(*v),
            _ => Err(self.mismatch(index, ArgKind::Float)),
        }
    }

    /// Argument `index` as a string.
    pub fn str(&self, index: usize) -> Result<&'a str> {
        match self.args.get(index) {
            Some(Value::Str(s)) => Ok(s),
            _ => Err(self.mismatch(index, ArgKind::Str)),
        }
    }

    fn mismatch(&self, index: usize, expected: ArgKind) -> Error {
        Error::ArgumentMismatch {
            procedure: self.name.to_string(),
            index,
            expected,
        }
    }
}

/// Receiver of decoded calls.
///
/// Plain procedures dispatch on `call.name`; instanced procedures route
/// through `call.instance_id()` into whatever registry the target keeps.
pub trait CallTarget {
    fn dispatch(&mut self, call: Call<'_>) -> Result<()>;
}

impl<F> CallTarget for F
where
    F: FnMut(Call<'_>) -> Result<()>,
{
    fn dispatch(&mut self, call: Call<'_>) -> Result<()> {
        self(call)
    }
}
