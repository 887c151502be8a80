// SPDX-License-Identifier: AGPL-3.0-or-later
//! Benchmark for topology indexing and root-port tracing.
//!
//! Uses a synthetic dense-GPU host (root ports feeding two-level switches)
//! replayed from memory, so the numbers reflect the algorithm rather than
//! sysfs or process spawn latency.

use criterion::{criterion_group, criterion_main, Criterion};
use rootport::source::{SnapshotDevice, SnapshotSource};
use rootport::topology::{collect_records, GpuClassifier, RootPortTracer, TopologyIndex};
use rootport::{discover_gpu_root_ports, DeviceAttributeSource, PciAddress};

/// `ports` root ports on bus 0, each behind it a switch with `gpus` GPUs.
fn synthetic_host(ports: u8, gpus: u8) -> SnapshotSource {
    let mut devices = Vec::new();
    let mut next_bus: u8 = 1;
    for port in 0..ports {
        let upstream = next_bus;
        let switch_bus = next_bus + 1;
        next_bus += 2;
        devices.push(SnapshotDevice::bridge(PciAddress::new(0, 0, port, 0), upstream));
        devices.push(SnapshotDevice::bridge(PciAddress::new(0, upstream, 0, 0), switch_bus));
        for slot in 0..gpus {
            let gpu_bus = next_bus;
            next_bus += 1;
            devices.push(SnapshotDevice::bridge(PciAddress::new(0, switch_bus, slot, 0), gpu_bus));
            devices.push(SnapshotDevice::gpu(PciAddress::new(0, gpu_bus, 0, 0)));
            devices.push(SnapshotDevice::endpoint(PciAddress::new(0, gpu_bus, 0, 1), 0x040300));
        }
    }
    SnapshotSource::from_devices(devices)
}

fn bench_discovery(c: &mut Criterion) {
    let source = synthetic_host(8, 8);
    c.bench_function("discover_8x8", |b| {
        b.iter(|| {
            let _ = discover_gpu_root_ports(&source);
        });
    });
}

fn bench_trace_only(c: &mut Criterion) {
    let source = synthetic_host(8, 8);
    let addresses = source.list_device_addresses().unwrap_or_default();
    let collected = collect_records(&source, &addresses, 1);
    let index = TopologyIndex::build(&collected.records);
    let gpus = GpuClassifier::default().gpus(&collected.records);

    c.bench_function("index_build_8x8", |b| {
        b.iter(|| TopologyIndex::build(&collected.records));
    });
    c.bench_function("trace_all_8x8", |b| {
        let tracer = RootPortTracer::new(&index);
        b.iter(|| gpus.iter().map(|&g| tracer.trace(g)).count());
    });
}

criterion_group!(benches, bench_discovery, bench_trace_only);
criterion_main!(benches);
