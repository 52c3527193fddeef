use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emu_core::cpu_6502::{ArrayMemory, Cpu6502, RunOptions};

/// A small busy loop touching the common addressing modes:
///   LDA #$42 / STA $2000 / LDX #$10 / INX / DEX / ADC $2000 / JMP loop
const LOOP_PROGRAM: &[u8] = &[
    0xa9, 0x42, // LDA #$42
    0x8d, 0x00, 0x20, // STA $2000
    0xa2, 0x10, // LDX #$10
    0xe8, // INX
    0xca, // DEX
    0x6d, 0x00, 0x20, // ADC $2000
    0x4c, 0x00, 0x08, // JMP $0800
];

fn fresh_cpu() -> Cpu6502<ArrayMemory> {
    let mut mem = ArrayMemory::new();
    mem.load_program(0x0800, LOOP_PROGRAM);
    let mut cpu = Cpu6502::new(mem);
    cpu.reset();
    cpu
}

fn bench_cpu_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_6502_step");

    group.bench_function("single_instruction", |b| {
        b.iter(|| {
            let mut cpu = fresh_cpu();
            cpu.step();
            black_box(cpu.a);
        });
    });

    group.finish();
}

fn bench_cpu_run_budget(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_6502_run");

    for budget in [100u64, 1_000, 17_050].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(budget), budget, |b, &budget| {
            b.iter(|| {
                let mut cpu = fresh_cpu();
                cpu.run(&RunOptions::default(), budget);
                black_box(cpu.frame_cycles);
            });
        });
    }

    group.finish();
}

fn bench_cpu_reset(c: &mut Criterion) {
    c.bench_function("cpu_6502_reset", |b| {
        let mut cpu = fresh_cpu();
        b.iter(|| {
            cpu.reset();
            black_box(cpu.pc);
        });
    });
}

criterion_group!(benches, bench_cpu_step, bench_cpu_run_budget, bench_cpu_reset);
criterion_main!(benches);
