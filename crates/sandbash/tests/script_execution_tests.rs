//! End-to-end script scenarios
//!
//! Larger scripts that cross module boundaries: expansion feeding control
//! flow, functions over arrays, heredocs into loops, option toggles
//! changing behavior mid-script.

use sandbash::Bash;

async fn out(script: &str) -> String {
    let mut bash = Bash::new();
    let result = bash.exec(script).await.unwrap();
    assert_eq!(result.exit_code, 0, "script failed: {}", result.stderr);
    result.stdout
}

async fn run(script: &str) -> sandbash::ExecResult {
    let mut bash = Bash::new();
    bash.exec(script).await.unwrap()
}

#[tokio::test]
async fn word_count_over_heredoc() {
    let script = "\
count=0
while read line; do
  count=$((count + 1))
done <<EOF
first
second
third
EOF
echo $count";
    assert_eq!(out(script).await, "3\n");
}

#[tokio::test]
async fn function_building_an_array() {
    let script = "\
collect() {
  local i
  for ((i = 1; i <= $1; i++)); do
    result+=($((i * i)))
  done
}
result=()
collect 4
echo \"${result[@]}\"
echo ${#result[@]}";
    assert_eq!(out(script).await, "1 4 9 16\n4\n");
}

#[tokio::test]
async fn case_dispatch_over_extensions() {
    let script = "\
classify() {
  case $1 in
    *.rs) echo rust;;
    *.py) echo python;;
    *.[ch]) echo c;;
    *) echo unknown;;
  esac
}
classify main.rs
classify tool.py
classify lib.h
classify notes.txt";
    assert_eq!(out(script).await, "rust\npython\nc\nunknown\n");
}

#[tokio::test]
async fn recursive_function_with_arithmetic() {
    let script = "\
fact() {
  if (( $1 <= 1 )); then
    echo 1
  else
    local rest=$(fact $(($1 - 1)))
    echo $(( $1 * rest ))
  fi
}
fact 6";
    assert_eq!(out(script).await, "720\n");
}

#[tokio::test]
async fn filesystem_round_trip_through_loops() {
    let script = "\
mkdir_done=0
cd /tmp
for name in beta alpha gamma; do
  echo \"$name\" > \"$name.txt\"
done
for f in *.txt; do
  cat \"$f\"
done";
    assert_eq!(out(script).await, "alpha\nbeta\ngamma\n");
}

#[tokio::test]
async fn getopts_loop_with_silent_mode() {
    let script = "\
set -- -x -f out.txt positional
while getopts ':xf:' opt; do
  case $opt in
    x) echo flag-x;;
    f) echo file=$OPTARG;;
    :) echo missing=$OPTARG;;
    \\?) echo bad=$OPTARG;;
  esac
done
shift $((OPTIND - 1))
echo rest=$1";
    assert_eq!(out(script).await, "flag-x\nfile=out.txt\nrest=positional\n");
}

#[tokio::test]
async fn string_processing_with_parameter_ops() {
    let script = "\
path=/usr/local/lib/libfoo.so.1
echo ${path##*/}
echo ${path%/*}
base=${path##*/}
echo ${base%%.*}";
    assert_eq!(out(script).await, "libfoo.so.1\n/usr/local/lib\nlibfoo\n");
}

#[tokio::test]
async fn ifs_driven_record_parsing() {
    let script = "\
record='alice:x:1000:users'
IFS=: read name pass uid group <<< \"$record\"
echo \"$name/$uid\"";
    // The prefix IFS assignment scopes to read only.
    let result = run(script).await;
    assert_eq!(result.stdout, "alice/1000\n");
}

#[tokio::test]
async fn errexit_and_pipefail_interact() {
    let script = "\
set -e -o pipefail
echo start
false | true && echo forgiven
echo done";
    // The failing pipeline sits left of &&, so errexit forgives it.
    let result = run(script).await;
    assert_eq!(result.stdout, "start\ndone\n");
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn errexit_aborts_mid_pipeline_chain() {
    let script = "set -e -o pipefail\necho start\ntrue | false\necho unreachable";
    let result = run(script).await;
    assert_eq!(result.stdout, "start\n");
    assert_eq!(result.exit_code, 1);
}

#[tokio::test]
async fn nested_loops_with_labelled_break() {
    let script = "\
for i in 1 2 3; do
  for j in a b c; do
    if [[ $i$j == 2b ]]; then
      break 2
    fi
    echo $i$j
  done
done
echo after";
    assert_eq!(out(script).await, "1a\n1b\n1c\n2a\nafter\n");
}

#[tokio::test]
async fn dynamic_unset_masks_in_function() {
    let script = "\
x=global
f() {
  local x=local
  unset x
  echo \"[${x-unset}]\"
}
f
echo $x";
    assert_eq!(out(script).await, "[unset]\nglobal\n");
}

#[tokio::test]
async fn alias_round_trip_across_parses() {
    let mut bash = Bash::new();
    bash.exec("shopt -s expand_aliases; alias greet='echo hello'")
        .await
        .unwrap();
    let result = bash.exec("greet world").await.unwrap();
    assert_eq!(result.stdout, "hello world\n");

    bash.exec("unalias greet").await.unwrap();
    let result = bash.exec("greet world").await.unwrap();
    assert_eq!(result.exit_code, 127);
}

#[tokio::test]
async fn source_defines_functions_and_returns() {
    let script = "\
cat > /tmp/lib.sh <<'EOF'
helper() { echo from-helper; }
lib_loaded=yes
return 0
echo never-reached
EOF
source /tmp/lib.sh
helper
echo $lib_loaded";
    assert_eq!(out(script).await, "from-helper\nyes\n");
}

#[tokio::test]
async fn eval_composes_dynamic_assignments() {
    let script = "\
for i in 1 2 3; do
  eval \"var_$i=$((i * 10))\"
done
echo $var_1 $var_2 $var_3";
    assert_eq!(out(script).await, "10 20 30\n");
}

#[tokio::test]
async fn indirect_expansion_walks_names() {
    let script = "\
alpha=1 beta=2
for name in ${!a*} ${!b*}; do
  echo \"$name=${!name}\"
done";
    assert_eq!(out(script).await, "alpha=1\nbeta=2\n");
}

#[tokio::test]
async fn array_slices_and_replacement() {
    let script = "\
words=(the quick brown fox jumps)
echo ${words[@]:1:3}
echo ${words[@]/o/0}
echo ${words[-1]}";
    assert_eq!(out(script).await, "quick brown fox\nthe quick br0wn f0x jumps\njumps\n");
}

#[tokio::test]
async fn regex_captures_drive_logic() {
    let script = "\
line='error: code 42 in module io'
if [[ $line =~ code\\ ([0-9]+)\\ in\\ module\\ ([a-z]+) ]]; then
  echo \"code=${BASH_REMATCH[1]} module=${BASH_REMATCH[2]}\"
fi";
    assert_eq!(out(script).await, "code=42 module=io\n");
}

#[tokio::test]
async fn exit_status_of_subshell_chain() {
    let script = "( exit 3 ); echo $?; ( true ); echo $?";
    assert_eq!(out(script).await, "3\n0\n");
}

#[tokio::test]
async fn heredoc_tab_stripping_inside_function() {
    let script = "show() {\n\tcat <<-EOF\n\t\tline\n\tEOF\n}\nshow";
    assert_eq!(out(script).await, "line\n");
}

#[tokio::test]
async fn arithmetic_for_over_array_indices() {
    let script = "\
data=(10 20 30 40)
sum=0
for ((i = 0; i < ${#data[@]}; i++)); do
  sum=$((sum + data[i]))
done
echo $sum";
    assert_eq!(out(script).await, "100\n");
}

#[tokio::test]
async fn until_loop_counts_down() {
    let script = "n=3; until (( n == 0 )); do echo $n; ((n--)); done";
    assert_eq!(out(script).await, "3\n2\n1\n");
}

#[tokio::test]
async fn command_substitution_nests() {
    let script = "echo $(echo outer $(echo inner))";
    assert_eq!(out(script).await, "outer inner\n");
}

#[tokio::test]
async fn stderr_stays_separate_from_stdout() {
    let script = "echo to-out; no_such_zz; echo also-out";
    let result = run(script).await;
    assert_eq!(result.stdout, "to-out\nalso-out\n");
    assert!(result.stderr.contains("command not found"));
    assert!(!result.stdout.contains("command not found"));
}

#[tokio::test]
async fn type_reports_resolution_order() {
    let script = "\
f() { :; }
type f
type echo
type cd
type missing_zz || echo absent";
    let result = run(script).await;
    assert_eq!(
        result.stdout,
        "f is a function\necho is a shell builtin\ncd is a shell builtin\nabsent\n"
    );
}

#[tokio::test]
async fn trap_listing_and_clearing() {
    let script = "\
trap 'echo one' EXIT
trap -p
trap - EXIT
trap -p
echo end";
    let result = run(script).await;
    assert_eq!(result.stdout, "trap -- 'echo one' EXIT\nend\n");
}

#[tokio::test]
async fn printf_builds_table() {
    let script = "\
for pair in 'a 1' 'bb 22'; do
  set -- $pair
  printf '%-4s|%3d\\n' \"$1\" \"$2\"
done";
    assert_eq!(out(script).await, "a   |  1\nbb  | 22\n");
}

#[tokio::test]
async fn deep_quoting_survives() {
    let script = r#"x='it'\''s'; echo "$x""#;
    assert_eq!(out(script).await, "it's\n");
}

#[tokio::test]
async fn exported_environment_is_scoped() {
    let script = "\
outer=visible
export exported=yes
f() { echo $exported $outer; }
f";
    assert_eq!(out(script).await, "yes visible\n");
}

#[tokio::test]
async fn directory_stack_is_subshell_local() {
    let script = "\
pushd /tmp > /dev/null
( pushd / > /dev/null; dirs )
dirs";
    // The subshell's extra entry vanishes with its snapshot.
    assert_eq!(out(script).await, "/ /tmp /home/user\n/tmp /home/user\n");
}

#[tokio::test]
async fn pushd_updates_oldpwd_like_cd() {
    let script = "pushd /tmp > /dev/null; echo $OLDPWD; popd > /dev/null; echo $OLDPWD";
    assert_eq!(out(script).await, "/home/user\n/tmp\n");
}

#[tokio::test]
async fn select_with_invalid_then_valid_choice() {
    let script = "\
printf '9\\n1\\n' > /tmp/choices
select item in one two; do
  echo \"got [${item}]\"
  if [[ -n $item ]]; then break; fi
done < /tmp/choices";
    let result = run(script).await;
    assert_eq!(result.stdout, "got []\ngot [one]\n");
}
